#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use nalgebra::Translation3;

    use crate::control_loop::{CartesianController, ControlMode};
    use crate::kinematic_traits::ForwardKinematics;
    use crate::parameter_error::ParameterError;
    use crate::parameters::ControlConfig;
    use crate::tests::test_utils::{kinematics_at, state_of, twist_of};
    use crate::urdf::from_urdf_file;

    const URDF: &str = "src/tests/data/planar_arm.urdf";
    const CONFIG: &str = "src/tests/data/cartesian_control.yaml";

    #[test]
    fn test_load_config() {
        let config = ControlConfig::from_yaml_file(CONFIG).expect("readable config");
        assert_eq!(config.controller.max_joint_velocity, 1.5);
        assert_eq!(config.controller.redundancy_gain, 0.5);
        assert_eq!(config.control_loop.period, Duration::from_millis(20));
        assert_eq!(config.control_loop.command_freshness, Duration::from_millis(200));
        assert_eq!(config.control_loop.redundancy_freshness, Duration::from_millis(300));
        assert_eq!(config.control_loop.redundant_joint.as_deref(), Some("elbow"));
        assert_eq!(config.end_effector.as_deref(), Some("tool0"));
    }

    #[test]
    fn test_missing_files() {
        assert!(matches!(ControlConfig::from_yaml_file("src/tests/data/missing.yaml"),
                         Err(ParameterError::IoError(_))));
        assert!(matches!(from_urdf_file("src/tests/data/missing.urdf", None),
                         Err(ParameterError::IoError(_))));
    }

    #[test]
    fn test_urdf_robot_under_control() {
        let config = ControlConfig::from_yaml_file(CONFIG).unwrap();
        let robot = Arc::new(from_urdf_file(URDF, config.end_effector.as_deref()).unwrap());
        assert_eq!(robot.actuated_joints(), ["shoulder", "elbow"]);

        let controller = CartesianController::new(robot.clone(), &config).unwrap();
        let positions = [0.0, 0.0];
        let start = kinematics_at(robot.as_ref(), &positions).end_effector;
        assert!((start.translation.x - 2.0).abs() < 1e-12);

        controller.update_joint_state(state_of(robot.as_ref(), &positions));
        controller.update_pose_command(Translation3::new(0.0, 0.1, 0.0) * start);
        let output = controller.cycle();
        assert_eq!(output.mode, ControlMode::Tracking);
        assert_eq!(output.joint_names, vec!["shoulder".to_string(), "elbow".to_string()]);

        // Lateral velocity toward the target
        let twist = twist_of(robot.as_ref(), &positions, &output.velocities);
        assert!(twist[1] > 0.0, "{:?}", twist);
    }
}
