//! Periodic control loop and the shared state it works on.
//!
//! Joint measurements, pose commands and redundancy commands arrive asynchronously from
//! independent callbacks. Each of them replaces its stored value under one mutex; the
//! control cycle holds the same mutex for its whole read-compute step, so it always sees
//! a consistent snapshot. Updates that arrive during a cycle are used by the next one.
//! Stale commands expire after their freshness window instead of being cancelled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::control_error::ControlError;
use crate::controller::DifferentialController;
use crate::jacobian::Jacobian;
use crate::kinematic_traits::{ForwardKinematics, JointState};
use crate::parameters::{ControlConfig, LoopParameters};
use crate::transform::Transform;

/// Latest desired end effector pose with its receipt time.
#[derive(Debug, Clone)]
pub struct PoseCommand {
    pub target: Transform,
    pub received: Instant,
}

/// Latest target of the redundant joint with its receipt time.
#[derive(Debug, Clone)]
pub struct RedundancyCommand {
    pub target: f64,
    pub received: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMode {
    /// Moving the end effector toward the pose command.
    Tracking,
    /// Holding the current pose while pursuing the redundancy target.
    HoldingPose,
    /// No fresh command: zero velocities.
    Idle,
    /// The cycle could not compute a command: zero velocities.
    Fault,
}

/// Joint velocity command of one control cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlOutput {
    pub joint_names: Vec<String>,

    /// One velocity per actuated joint, same order as `joint_names` (rad/s).
    pub velocities: Vec<f64>,
    pub mode: ControlMode,

    /// Rotation error was unavailable this cycle and only translation was tracked.
    pub degenerate_rotation: bool,

    /// Factor applied to respect the joint velocity limit.
    pub scale: f64,
}

impl ControlOutput {
    fn zero(joint_names: &[String], mode: ControlMode) -> Self {
        ControlOutput {
            joint_names: joint_names.to_vec(),
            velocities: vec![0.0; joint_names.len()],
            mode,
            degenerate_rotation: false,
            scale: 1.0,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.velocities.iter().all(|v| *v == 0.0)
    }
}

#[derive(Debug)]
struct ControlState {
    joint_state: Option<JointState>,
    pose_command: Option<PoseCommand>,
    redundancy_command: Option<RedundancyCommand>,
    last_mode: ControlMode,
}

/// Owns the robot model, the controller and all state shared with the input callbacks.
pub struct CartesianController {
    robot: Arc<dyn ForwardKinematics>,
    controller: DifferentialController,
    parameters: LoopParameters,
    state: Mutex<ControlState>,
}

impl CartesianController {
    /// Builds the controller for the given robot. The redundancy target applies to the
    /// joint named in the configuration, or to the first actuated joint.
    ///
    /// # Errors
    /// `MalformedTree` if the robot has no actuated joints, `UnknownJoint` if the configured
    /// redundant joint is not an actuated joint of the robot.
    pub fn new(robot: Arc<dyn ForwardKinematics>, config: &ControlConfig) -> Result<Self, ControlError> {
        if robot.dof() == 0 {
            return Err(ControlError::MalformedTree("robot has no actuated joints".into()));
        }
        let joint_index = match &config.control_loop.redundant_joint {
            Some(name) => robot.actuated_joints().iter().position(|j| j == name)
                .ok_or_else(|| ControlError::UnknownJoint(name.clone()))?,
            None => 0,
        };
        let controller = DifferentialController::with_redundant_joint(config.controller, joint_index);
        Ok(Self::with_controller(robot, controller, config.control_loop.clone()))
    }

    /// Builds the controller with a custom differential controller (for instance, with a
    /// different null space objective).
    pub fn with_controller(robot: Arc<dyn ForwardKinematics>, controller: DifferentialController,
                           parameters: LoopParameters) -> Self {
        CartesianController {
            robot,
            controller,
            parameters,
            state: Mutex::new(ControlState {
                joint_state: None,
                pose_command: None,
                redundancy_command: None,
                last_mode: ControlMode::Idle,
            }),
        }
    }

    pub fn joint_names(&self) -> &[String] {
        self.robot.actuated_joints()
    }

    pub fn parameters(&self) -> &LoopParameters {
        &self.parameters
    }

    /// State values are always replaced whole, so a poisoned lock still holds consistent data.
    fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update_joint_state(&self, joint_state: JointState) {
        self.lock().joint_state = Some(joint_state);
    }

    pub fn update_pose_command(&self, target: Transform) {
        self.update_pose_command_at(target, Instant::now());
    }

    pub fn update_pose_command_at(&self, target: Transform, received: Instant) {
        self.lock().pose_command = Some(PoseCommand { target, received });
    }

    pub fn update_redundancy_command(&self, target: f64) {
        self.update_redundancy_command_at(target, Instant::now());
    }

    pub fn update_redundancy_command_at(&self, target: f64, received: Instant) {
        self.lock().redundancy_command = Some(RedundancyCommand { target, received });
    }

    /// Runs one control cycle now.
    pub fn cycle(&self) -> ControlOutput {
        self.cycle_at(Instant::now())
    }

    /// Runs one control cycle, judging command freshness against `now`.
    pub fn cycle_at(&self, now: Instant) -> ControlOutput {
        let mut state = self.lock();

        let fresh_pose = state.pose_command.as_ref()
            .filter(|c| now.saturating_duration_since(c.received) < self.parameters.command_freshness)
            .map(|c| c.target);
        let fresh_redundancy = state.redundancy_command.as_ref()
            .filter(|c| now.saturating_duration_since(c.received) < self.parameters.redundancy_freshness)
            .map(|c| c.target);

        let output = match (fresh_pose, fresh_redundancy) {
            (Some(target), _) => self.compute(&state, ControlMode::Tracking, Some(target), None),
            (None, Some(target)) => self.compute(&state, ControlMode::HoldingPose, None, Some(target)),
            (None, None) => ControlOutput::zero(self.joint_names(), ControlMode::Idle),
        };

        if output.mode != state.last_mode {
            debug!("Control mode {:?} -> {:?}", state.last_mode, output.mode);
            state.last_mode = output.mode;
        }
        output
    }

    fn compute(&self, state: &ControlState, mode: ControlMode,
               pose_target: Option<Transform>, redundancy_target: Option<f64>) -> ControlOutput {
        let Some(joint_state) = state.joint_state.as_ref() else {
            warn!("No joint state received yet, commanding zero velocities");
            return ControlOutput::zero(self.joint_names(), ControlMode::Fault);
        };

        match self.velocities(joint_state, pose_target, redundancy_target) {
            Ok(mut output) => {
                output.mode = mode;
                output
            }
            Err(e) => {
                if e.is_recoverable() {
                    warn!("Control cycle skipped, commanding zero velocities: {}", e);
                } else {
                    error!("Control cycle failed, commanding zero velocities: {}", e);
                }
                ControlOutput::zero(self.joint_names(), ControlMode::Fault)
            }
        }
    }

    fn velocities(&self, joint_state: &JointState, pose_target: Option<Transform>,
                  redundancy_target: Option<f64>) -> Result<ControlOutput, ControlError> {
        let fk = self.robot.forward_kinematics(joint_state)?;
        let jacobian = Jacobian::from_state(&fk);
        // Without a pose command, hold the current pose
        let desired = pose_target.unwrap_or(fk.end_effector);

        let command = self.controller.compute_joint_velocities(
            &jacobian, &fk.end_effector, &desired, redundancy_target, &fk.angles())?;

        Ok(ControlOutput {
            joint_names: self.joint_names().to_vec(),
            velocities: command.velocities.iter().copied().collect(),
            mode: ControlMode::Fault, // set by the caller
            degenerate_rotation: command.degenerate_rotation,
            scale: command.scale,
        })
    }

    /// Runs the control cycle with the configured period on the calling thread until `stop`
    /// is raised. Every output is handed to `sink` outside the lock. If a cycle overruns
    /// the period, the next one starts immediately without trying to catch up.
    pub fn run<F>(&self, mut sink: F, stop: &AtomicBool)
    where
        F: FnMut(ControlOutput),
    {
        info!("Control loop started, period {:?}", self.parameters.period);
        let mut next = Instant::now();
        while !stop.load(Ordering::Acquire) {
            sink(self.cycle());
            next += self.parameters.period;
            let now = Instant::now();
            if next > now {
                thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        info!("Control loop stopped");
    }

    /// Runs [CartesianController::run] on a dedicated thread.
    pub fn spawn<F>(self: Arc<Self>, sink: F) -> std::io::Result<LoopHandle>
    where
        F: FnMut(ControlOutput) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let thread = thread::Builder::new()
            .name("cartesian-control".into())
            .spawn(move || self.run(sink, &flag))?;
        Ok(LoopHandle { stop, thread })
    }
}

/// Handle of a control loop running on its own thread.
pub struct LoopHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl LoopHandle {
    /// Signals the loop to stop and waits for it to finish the current cycle.
    pub fn stop(self) -> thread::Result<()> {
        self.stop.store(true, Ordering::Release);
        self.thread.join()
    }
}
