use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nalgebra::{Isometry3, Translation3};
use tracing::info;

use rs_cartesian_control::control_loop::CartesianController;
use rs_cartesian_control::kinematic_traits::{ForwardKinematics, JointState};
use rs_cartesian_control::parameters::ControlConfig;
use rs_cartesian_control::robots::seven_joint_arm;
use rs_cartesian_control::urdf::from_urdf_file;
use rs_cartesian_control::utils::{dump_joints, dump_pose};

/// Moves a simulated robot to the displaced end effector pose and reports convergence.
#[derive(Parser)]
#[command(name = "rs-cartesian-control")]
#[command(about = "Cartesian velocity control of a simulated serial robot", long_about = None)]
#[command(version)]
struct Cli {
    /// Robot description. The built-in seven joint arm is used if not given.
    #[arg(long)]
    urdf: Option<PathBuf>,

    /// YAML file with the cartesian_control section
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target displacement of the end effector in the root frame (m)
    #[arg(long, num_args = 3, value_names = ["DX", "DY", "DZ"], allow_negative_numbers = true,
          default_values_t = [0.1, -0.05, 0.0])]
    offset: Vec<f64>,

    /// Target angle of the redundant joint (rad), pursued in the null space
    #[arg(long, allow_negative_numbers = true)]
    redundancy: Option<f64>,

    /// Number of control cycles to simulate
    #[arg(long, default_value_t = 50)]
    cycles: usize,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ControlConfig::from_yaml_file(path)
            .with_context(|| format!("Failed to read configuration {}", path.display()))?,
        None => ControlConfig::default(),
    };

    let (robot, start): (Arc<dyn ForwardKinematics>, Vec<f64>) = match &cli.urdf {
        Some(path) => {
            let tree = from_urdf_file(path, config.end_effector.as_deref())
                .with_context(|| format!("Failed to load robot from {}", path.display()))?;
            let zeros = vec![0.0; tree.dof()];
            (Arc::new(tree), zeros)
        }
        None => (Arc::new(seven_joint_arm()?), vec![0.0, 0.5, 0.0, -1.2, 0.0, 0.8, 0.0]),
    };

    let names = robot.actuated_joints().to_vec();
    let controller = CartesianController::new(robot.clone(), &config)
        .context("Failed to set up the controller")?;
    info!("Controlling {} joints: {}", names.len(), names.join(", "));

    let mut positions = start;
    let initial = robot.forward_kinematics(&JointState::from_names_positions(&names, &positions))?;
    let [dx, dy, dz] = <[f64; 3]>::try_from(cli.offset.as_slice())
        .context("Offset needs exactly three values")?;
    let target: Isometry3<f64> = Translation3::new(dx, dy, dz) * initial.end_effector;
    println!("Start and target poses:");
    dump_pose(&initial.end_effector);
    dump_pose(&target);

    let dt = config.control_loop.period.as_secs_f64();
    for cycle in 0..cli.cycles {
        controller.update_joint_state(JointState::from_names_positions(&names, &positions));
        controller.update_pose_command(target);
        if let Some(redundancy) = cli.redundancy {
            controller.update_redundancy_command(redundancy);
        }

        let output = controller.cycle();
        for (q, v) in positions.iter_mut().zip(&output.velocities) {
            *q += v * dt;
        }

        let reached = robot.forward_kinematics(&JointState::from_names_positions(&names, &positions))?;
        let error = (target.translation.vector - reached.end_effector.translation.vector).norm();
        let angle = target.rotation.angle_to(&reached.end_effector.rotation);
        info!("Cycle {:3} {:?}: position error {:.6} m, rotation error {:.6} rad, scale {:.3}",
            cycle, output.mode, error, angle, output.scale);
    }

    println!("Final joints (degrees):");
    dump_joints(&names, &positions);
    Ok(())
}
