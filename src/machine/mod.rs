//! Controller machines and the commands run on them.
//!
//! A `Machine` satisfies `core::ControllerNode` by issuing exactly one
//! local or remote command per operation. Which runner a machine gets is
//! decided once, at construction: the replica set member we are running
//! on executes directly, every other member goes over ssh.

mod errors;
mod runner;
mod scripts;

pub use errors::{Error, MachineResult};
pub use runner::{CommandRunner, LocalRunner, RemoteRunner, SYSTEM_IDENTITY};

use rand::Rng;

use crate::core::{ControllerNode, CoreResult, NodeStatus, ReplicaSetMember, Service, Version};

/// Returns the controller node for a replica set member.
///
/// The member name is `<machine IP>:<database port>`; the IP decides
/// where commands for this node go.
pub fn node_for_member(member: &ReplicaSetMember) -> Box<dyn ControllerNode> {
    let ip = member.ip().to_string();
    if member.self_node {
        Box::new(Machine::new(
            ip,
            member.juju_machine_id.clone(),
            true,
            LocalRunner::new(),
        ))
    } else {
        let runner = RemoteRunner::new(ip.clone());
        Box::new(Machine::new(
            ip,
            member.juju_machine_id.clone(),
            false,
            runner,
        ))
    }
}

/// One controller machine.
#[derive(Debug)]
pub struct Machine<R: CommandRunner> {
    ip: String,
    juju_id: String,
    self_node: bool,
    runner: R,
}

impl<R: CommandRunner> Machine<R> {
    pub fn new(ip: impl Into<String>, juju_id: impl Into<String>, self_node: bool, runner: R) -> Machine<R> {
        Machine {
            ip: ip.into(),
            juju_id: juju_id.into(),
            self_node,
            runner,
        }
    }

    fn service_name(&self, service: Service) -> String {
        match service {
            Service::MachineAgent => format!("jujud-machine-{}", self.juju_id),
            Service::Database => "juju-db".to_string(),
        }
    }

    fn systemctl(&self, verb: &str, service: Service) -> MachineResult<()> {
        let name = self.service_name(service);
        let output = self.runner.run(&["sudo", "systemctl", verb, name.as_str()])?;
        if !output.trim().is_empty() {
            return Err(Error::UnexpectedOutput {
                operation: format!("{} {}", verb, name),
                output,
            });
        }
        Ok(())
    }
}

impl<R: CommandRunner> ControllerNode for Machine<R> {
    fn ip(&self) -> &str {
        &self.ip
    }

    fn ping(&self) -> CoreResult<()> {
        if self.self_node {
            // We are running here.
            return Ok(());
        }
        let message = format!("hello from {}", self.ip);
        let output = self.runner.run(&["echo", message.as_str()])?;
        // ssh with a forced tty turns the newline into \r\n.
        let expected = format!("{}\r\n", message);
        if output != expected {
            return Err(Error::PingFailed {
                ip: self.ip.clone(),
                expected,
                got: output,
            }
            .into());
        }
        Ok(())
    }

    fn status(&self) -> CoreResult<NodeStatus> {
        let output = self
            .runner
            .run_script(scripts::STATUS, &[self.juju_id.as_str()])?;
        let status = serde_yaml::from_str(&output).map_err(Error::StatusParse)?;
        Ok(status)
    }

    fn stop_service(&self, service: Service) -> CoreResult<()> {
        self.systemctl("stop", service)?;
        Ok(())
    }

    fn start_service(&self, service: Service) -> CoreResult<()> {
        self.systemctl("start", service)?;
        Ok(())
    }

    fn snapshot_database(&self) -> CoreResult<String> {
        let suffix = format!("{:08x}", rand::thread_rng().gen::<u32>());
        self.runner
            .run_script(scripts::SNAPSHOT_DATABASE, &[suffix.as_str()])?;
        Ok(suffix)
    }

    fn restore_snapshot(&self, name: &str) -> CoreResult<()> {
        self.runner.run_script(scripts::RESTORE_SNAPSHOT, &[name])?;
        Ok(())
    }

    fn discard_snapshot(&self, name: &str) -> CoreResult<()> {
        self.runner.run_script(scripts::DISCARD_SNAPSHOT, &[name])?;
        Ok(())
    }

    fn update_agent_version(&self, version: &Version) -> CoreResult<()> {
        let version = version.to_string();
        self.runner.run_script(
            scripts::UPDATE_AGENT_VERSION,
            &[version.as_str(), self.juju_id.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;
    use crate::core::MemberState;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Run(Vec<String>),
        Script { script: String, args: Vec<String> },
    }

    #[derive(Clone, Default)]
    struct RecordingRunner {
        calls: Rc<RefCell<Vec<Call>>>,
        responses: Rc<RefCell<VecDeque<MachineResult<String>>>>,
    }

    impl RecordingRunner {
        fn respond(&self, response: MachineResult<String>) {
            self.responses.borrow_mut().push_back(response);
        }

        fn next_response(&self) -> MachineResult<String> {
            self.responses
                .borrow_mut()
                .pop_front()
                .unwrap_or_else(|| Ok(String::new()))
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.borrow().clone()
        }
    }

    impl CommandRunner for RecordingRunner {
        fn run(&self, argv: &[&str]) -> MachineResult<String> {
            self.calls
                .borrow_mut()
                .push(Call::Run(argv.iter().map(|s| s.to_string()).collect()));
            self.next_response()
        }

        fn run_script(&self, script: &str, args: &[&str]) -> MachineResult<String> {
            self.calls.borrow_mut().push(Call::Script {
                script: script.to_string(),
                args: args.iter().map(|s| s.to_string()).collect(),
            });
            self.next_response()
        }
    }

    fn machine(self_node: bool) -> (RecordingRunner, Machine<RecordingRunner>) {
        let runner = RecordingRunner::default();
        let machine = Machine::new("10.5.7.23", "4", self_node, runner.clone());
        (runner, machine)
    }

    #[test]
    fn test_factory_splits_member_name() {
        let member = ReplicaSetMember {
            id: 2,
            name: "10.5.7.23:37017".to_string(),
            self_node: true,
            healthy: true,
            state: MemberState::Primary,
            juju_machine_id: "0".to_string(),
        };
        let node = node_for_member(&member);
        assert_eq!(node.ip(), "10.5.7.23");
        // The self node answers pings without running anything.
        node.ping().unwrap();
    }

    #[test]
    fn test_stop_machine_agent_command() {
        let (runner, machine) = machine(true);
        machine.stop_service(Service::MachineAgent).unwrap();
        assert_eq!(
            runner.calls(),
            vec![Call::Run(vec![
                "sudo".to_string(),
                "systemctl".to_string(),
                "stop".to_string(),
                "jujud-machine-4".to_string(),
            ])]
        );
    }

    #[test]
    fn test_start_database_command() {
        let (runner, machine) = machine(true);
        machine.start_service(Service::Database).unwrap();
        assert_eq!(
            runner.calls(),
            vec![Call::Run(vec![
                "sudo".to_string(),
                "systemctl".to_string(),
                "start".to_string(),
                "juju-db".to_string(),
            ])]
        );
    }

    #[test]
    fn test_stop_rejects_unexpected_output() {
        let (runner, machine) = machine(true);
        runner.respond(Ok("Warning: unit is masked\n".to_string()));
        let err = machine.stop_service(Service::MachineAgent).unwrap_err();
        assert!(err.to_string().contains("should not have produced output"));
    }

    #[test]
    fn test_ping_round_trips_echo() {
        let (runner, machine) = machine(false);
        runner.respond(Ok("hello from 10.5.7.23\r\n".to_string()));
        machine.ping().unwrap();
        assert_eq!(
            runner.calls(),
            vec![Call::Run(vec![
                "echo".to_string(),
                "hello from 10.5.7.23".to_string(),
            ])]
        );
    }

    #[test]
    fn test_ping_detects_garbled_reply() {
        let (runner, machine) = machine(false);
        runner.respond(Ok("something else\r\n".to_string()));
        let err = machine.ping().unwrap_err();
        assert!(err
            .to_string()
            .starts_with("ping controller machine 10.5.7.23 failed"));
    }

    #[test]
    fn test_status_parses_script_output() {
        let (runner, machine) = machine(true);
        runner.respond(Ok(
            "free-space: 16884899840\ndatabase-size: 12345\ndatabase-running: true\nmachine-agent-running: false\n"
                .to_string(),
        ));
        let status = machine.status().unwrap();
        assert_eq!(status.free_space, 16884899840);
        assert_eq!(status.database_size, 12345);
        assert!(status.database_running);
        assert!(!status.machine_agent_running);

        match &runner.calls()[0] {
            Call::Script { script, args } => {
                assert_eq!(script, scripts::STATUS);
                assert_eq!(args, &vec!["4".to_string()]);
            }
            other => panic!("expected script call, got {:?}", other),
        }
    }

    #[test]
    fn test_snapshot_returns_generated_suffix() {
        let (runner, machine) = machine(true);
        let suffix = machine.snapshot_database().unwrap();
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));

        match &runner.calls()[0] {
            Call::Script { script, args } => {
                assert_eq!(script, scripts::SNAPSHOT_DATABASE);
                assert_eq!(args, &vec![suffix]);
            }
            other => panic!("expected script call, got {:?}", other),
        }
    }

    #[test]
    fn test_restore_snapshot_passes_name() {
        let (runner, machine) = machine(true);
        machine.restore_snapshot("cafe0123").unwrap();
        match &runner.calls()[0] {
            Call::Script { script, args } => {
                assert_eq!(script, scripts::RESTORE_SNAPSHOT);
                assert_eq!(args, &vec!["cafe0123".to_string()]);
            }
            other => panic!("expected script call, got {:?}", other),
        }
    }

    #[test]
    fn test_update_agent_version_arguments() {
        let (runner, machine) = machine(true);
        machine
            .update_agent_version(&"2.7.6.3".parse().unwrap())
            .unwrap();
        match &runner.calls()[0] {
            Call::Script { script, args } => {
                assert_eq!(script, scripts::UPDATE_AGENT_VERSION);
                assert_eq!(args, &vec!["2.7.6.3".to_string(), "4".to_string()]);
            }
            other => panic!("expected script call, got {:?}", other),
        }
    }

    #[test]
    fn test_operation_errors_surface_verbatim() {
        let (runner, machine) = machine(true);
        runner.respond(Err(Error::CommandFailed(
            "Failed to stop juju-db.service: access denied".to_string(),
        )));
        let err = machine.stop_service(Service::Database).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to stop juju-db.service: access denied"
        );
    }
}
