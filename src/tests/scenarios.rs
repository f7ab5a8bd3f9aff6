#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use nalgebra::{Isometry3, Translation3, Vector3};

    use crate::control_loop::{CartesianController, ControlMode};
    use crate::kinematic_traits::ForwardKinematics;
    use crate::parameters::{ControlConfig, ControllerParameters};
    use crate::robots::{planar_two_link, seven_joint_arm};
    use crate::tests::test_utils::{integrate, kinematics_at, state_of, twist_of, BENT_POSTURE};
    use crate::tool::Tool;

    fn planar_config() -> ControlConfig {
        ControlConfig {
            controller: ControllerParameters { gain: 1.0, damping: 0.01, ..ControllerParameters::default() },
            ..ControlConfig::default()
        }
    }

    #[test]
    fn test_lateral_step_reduces_error() {
        let robot = Arc::new(planar_two_link(1.0, 1.0).unwrap());
        let controller = CartesianController::new(robot.clone(), &planar_config()).unwrap();

        let mut positions = vec![0.0, 0.0];
        let start = kinematics_at(robot.as_ref(), &positions).end_effector;
        let target = Translation3::new(0.0, 0.1, 0.0) * start;

        controller.update_joint_state(state_of(robot.as_ref(), &positions));
        controller.update_pose_command(target);
        let output = controller.cycle();
        assert_eq!(output.mode, ControlMode::Tracking);
        assert!(output.velocities.iter().any(|v| v.abs() > 1e-3), "{:?}", output.velocities);

        let error_before = (target.translation.y - start.translation.y).abs();
        integrate(&mut positions, &output.velocities, 0.1);
        let reached = kinematics_at(robot.as_ref(), &positions).end_effector;
        let error_after = (target.translation.y - reached.translation.y).abs();
        assert!(error_after < error_before, "Y error {} did not drop below {}", error_after, error_before);
    }

    #[test]
    fn test_stale_command_emits_zeros() {
        let robot = Arc::new(seven_joint_arm().unwrap());
        let controller = CartesianController::new(robot.clone(), &ControlConfig::default()).unwrap();
        let start = Instant::now();

        controller.update_joint_state(state_of(robot.as_ref(), &BENT_POSTURE));
        controller.update_pose_command_at(Isometry3::translation(0.3, 0.0, 0.8), start);

        let output = controller.cycle_at(start + Duration::from_millis(501));
        assert_eq!(output.mode, ControlMode::Idle);
        assert_eq!(output.velocities, vec![0.0; 7]);
        assert_eq!(output.joint_names.len(), 7);
    }

    #[test]
    fn test_redundancy_stays_in_null_space() {
        let robot = Arc::new(seven_joint_arm().unwrap());
        let controller = CartesianController::new(robot.clone(), &ControlConfig::default()).unwrap();

        // First joint at 0.0, target above it; no pose command at all
        controller.update_joint_state(state_of(robot.as_ref(), &BENT_POSTURE));
        controller.update_redundancy_command(0.5);
        let output = controller.cycle();

        assert_eq!(output.mode, ControlMode::HoldingPose);
        assert!(output.velocities[0] > 1e-6, "{:?}", output.velocities);

        let twist = twist_of(robot.as_ref(), &BENT_POSTURE, &output.velocities);
        assert!(twist.amax() < 1e-9, "End effector moves: {:?}", twist);
    }

    #[test]
    fn test_redundant_joint_reaches_target_without_moving_tool() {
        let robot = Arc::new(seven_joint_arm().unwrap());
        let controller = CartesianController::new(robot.clone(), &ControlConfig::default()).unwrap();

        let mut positions = BENT_POSTURE.to_vec();
        let start = kinematics_at(robot.as_ref(), &positions).end_effector;
        let initial_gap = 0.3;
        for _ in 0..100 {
            controller.update_joint_state(state_of(robot.as_ref(), &positions));
            controller.update_redundancy_command(initial_gap);
            let output = controller.cycle();
            integrate(&mut positions, &output.velocities, 0.1);
        }

        let reached = kinematics_at(robot.as_ref(), &positions).end_effector;
        let drift = (reached.translation.vector - start.translation.vector).norm();
        assert!(drift < 5e-3, "End effector drifted {} m", drift);
        assert!(positions[0] > 0.05, "Redundant joint did not move: {:?}", positions);
        assert!(positions[0] <= initial_gap + 1e-6);
    }

    #[test]
    fn test_seven_joint_arm_converges() {
        let robot = Arc::new(seven_joint_arm().unwrap());
        let controller = CartesianController::new(robot.clone(), &ControlConfig::default()).unwrap();

        let mut positions = BENT_POSTURE.to_vec();
        let start = kinematics_at(robot.as_ref(), &positions).end_effector;
        let target = Translation3::new(0.05, -0.05, 0.02) * start;

        for _ in 0..200 {
            controller.update_joint_state(state_of(robot.as_ref(), &positions));
            controller.update_pose_command(target);
            let output = controller.cycle();
            assert_eq!(output.mode, ControlMode::Tracking);
            integrate(&mut positions, &output.velocities, 0.1);
        }

        let reached = kinematics_at(robot.as_ref(), &positions).end_effector;
        let error = (target.translation.vector - reached.translation.vector).norm();
        let angle = target.rotation.angle_to(&reached.rotation);
        assert!(error < 1e-4, "Position error {}", error);
        assert!(angle < 1e-4, "Rotation error {}", angle);
    }

    #[test]
    fn test_velocity_limit_keeps_direction() {
        let robot = Arc::new(planar_two_link(1.0, 1.0).unwrap());
        let mut config = planar_config();
        config.controller.max_joint_velocity = 0.005;
        let limited = CartesianController::new(robot.clone(), &config).unwrap();
        let free = CartesianController::new(robot.clone(), &planar_config()).unwrap();

        let positions = [0.2, 0.7];
        let target = Translation3::new(0.0, 0.1, 0.0) * kinematics_at(robot.as_ref(), &positions).end_effector;
        for controller in [&limited, &free] {
            controller.update_joint_state(state_of(robot.as_ref(), &positions));
            controller.update_pose_command(target);
        }
        let a = limited.cycle();
        let b = free.cycle();

        assert!(a.scale < 1.0);
        assert!(a.velocities.iter().all(|v| v.abs() <= 0.005 + 1e-12));
        for (x, y) in a.velocities.iter().zip(&b.velocities) {
            assert!((x - y * a.scale).abs() < 1e-12);
        }
    }

    #[test]
    fn test_tool_frame_is_tracked() {
        let arm = Arc::new(seven_joint_arm().unwrap());
        let robot = Arc::new(Tool { robot: arm, tool: Isometry3::translation(0.0, 0.0, 0.2) });
        let controller = CartesianController::new(robot.clone(), &ControlConfig::default()).unwrap();

        let mut positions = BENT_POSTURE.to_vec();
        let target = Translation3::new(0.0, 0.03, -0.03) * kinematics_at(robot.as_ref(), &positions).end_effector;
        for _ in 0..200 {
            controller.update_joint_state(state_of(robot.as_ref(), &positions));
            controller.update_pose_command(target);
            integrate(&mut positions, &controller.cycle().velocities, 0.1);
        }
        let reached = kinematics_at(robot.as_ref(), &positions).end_effector;
        assert!((target.translation.vector - reached.translation.vector).norm() < 1e-4);
        assert_eq!(robot.dof(), 7);
    }

    #[test]
    fn test_off_chain_branch_stays_still() {
        use crate::kinematic_tree::{Joint, KinematicTreeBuilder};
        let robot = Arc::new(KinematicTreeBuilder::new()
            .add_link("base").add_link("upper").add_link("tip").add_link("camera")
            .add_joint("base", "upper",
                       Joint::revolute("shoulder", Isometry3::identity(), Vector3::z()).unwrap())
            .add_joint("upper", "tip",
                       Joint::revolute("elbow", Isometry3::translation(1.0, 0.0, 0.0), Vector3::z()).unwrap())
            .add_joint("upper", "camera",
                       Joint::revolute("pan", Isometry3::translation(0.5, 0.0, 0.0), Vector3::z()).unwrap())
            .end_effector("tip")
            .build()
            .unwrap());
        let controller = CartesianController::new(robot.clone(), &planar_config()).unwrap();
        let pan = robot.actuated_joints().iter().position(|j| j == "pan").unwrap();

        let positions = [0.3, 0.2, 0.4];
        let target = Translation3::new(0.05, 0.05, 0.0) * kinematics_at(robot.as_ref(), &positions).end_effector;
        controller.update_joint_state(state_of(robot.as_ref(), &positions));
        controller.update_pose_command(target);
        let output = controller.cycle();

        assert_eq!(output.mode, ControlMode::Tracking);
        assert_eq!(output.velocities[pan], 0.0);
        assert!(output.velocities.iter().any(|v| v.abs() > 1e-3));
    }
}
