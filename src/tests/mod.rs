mod scenarios;

#[cfg(feature = "allow_filesystem")]
mod test_from_files;
