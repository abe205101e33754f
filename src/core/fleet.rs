//! Fleet orchestrator: owns every virtual agent in the process
//!
//! Startup policy mirrors the error taxonomy: a walk or device problem
//! fails only the agent that owns it, while failure to bind an endpoint is
//! fatal and surfaces as a nonzero exit.

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::agent::Agent;
use crate::config::FleetConfig;
use crate::device::DeviceFactory;
use crate::{Error, Result};

/// Fleet lifecycle events, consumed by the launcher.
#[derive(Debug, Clone)]
pub enum FleetEvent {
    Started { agents: usize },
    Stopped,
    AgentStarted { name: String, address: String },
    AgentFailed { name: String, message: String },
}

pub struct Fleet {
    config: FleetConfig,
    factory: DeviceFactory,
    agents: Vec<Agent>,
    event_tx: mpsc::UnboundedSender<FleetEvent>,
    event_rx: Option<mpsc::UnboundedReceiver<FleetEvent>>,
    running: bool,
}

impl Fleet {
    pub fn new(config: FleetConfig) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            config,
            factory: DeviceFactory::new(),
            agents: Vec::new(),
            event_tx,
            event_rx: Some(event_rx),
            running: false,
        }
    }

    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<FleetEvent>> {
        self.event_rx.take()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub async fn start(&mut self) -> Result<()> {
        info!("Starting fleet with {} configured agents", self.config.agents.len());

        for agent_config in self.config.agents.clone() {
            let name = agent_config.name();
            // Devices are parsed eagerly, before the agent starts serving.
            let device = match &agent_config.device {
                Some(path) => self.factory.load(path),
                None => self.factory.default_device(),
            };
            let address = agent_config.address();
            let mut agent = Agent::new(agent_config, device);
            match agent.start().await {
                Ok(()) => {
                    let _ = self.event_tx.send(FleetEvent::AgentStarted {
                        name,
                        address,
                    });
                    self.agents.push(agent);
                }
                Err(e @ Error::Network(_)) => {
                    // Cannot bind the endpoint: the whole process is broken.
                    error!(agent = %name, "Failed to bind agent: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!(agent = %name, "Agent failed to start: {}", e);
                    let _ = self.event_tx.send(FleetEvent::AgentFailed {
                        name,
                        message: e.to_string(),
                    });
                }
            }
        }

        self.running = true;
        let _ = self.event_tx.send(FleetEvent::Started {
            agents: self.agents.len(),
        });
        info!("Fleet started with {} agents", self.agents.len());
        Ok(())
    }

    pub fn stop(&mut self) {
        info!("Stopping fleet");
        for agent in &mut self.agents {
            agent.stop();
        }
        self.running = false;
        let _ = self.event_tx.send(FleetEvent::Stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use std::io::Write;
    use std::path::PathBuf;

    fn walk_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("a.walk");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b".1.3.6.1.2.1.1.1.0 = STRING: \"x\"\n")
            .unwrap();
        path
    }

    fn fleet_config(agents: Vec<AgentConfig>) -> FleetConfig {
        FleetConfig {
            logging: Default::default(),
            agents,
        }
    }

    fn agent(walk: PathBuf, port: u16) -> AgentConfig {
        AgentConfig {
            name: None,
            device: None,
            walk,
            ip: "127.0.0.1".to_string(),
            port,
            community: "public".to_string(),
        }
    }

    #[tokio::test]
    async fn test_bad_walk_does_not_stop_other_agents() {
        let dir = tempfile::tempdir().unwrap();
        let mut fleet = Fleet::new(fleet_config(vec![
            agent(PathBuf::from("/nonexistent.walk"), 0),
            agent(walk_file(&dir), 0),
        ]));
        let mut events = fleet.take_event_receiver().unwrap();
        fleet.start().await.unwrap();
        assert_eq!(fleet.agent_count(), 1);
        assert!(fleet.is_running());

        let mut failed = 0;
        let mut started = 0;
        while let Ok(event) = events.try_recv() {
            match event {
                FleetEvent::AgentFailed { .. } => failed += 1,
                FleetEvent::AgentStarted { .. } => started += 1,
                _ => {}
            }
        }
        assert_eq!((failed, started), (1, 1));
        fleet.stop();
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // Occupy a port, then ask the fleet to bind it again.
        let holder = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = holder.local_addr().unwrap().port();
        let mut fleet = Fleet::new(fleet_config(vec![agent(walk_file(&dir), port)]));
        assert!(fleet.start().await.is_err());
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = tempfile::tempdir().unwrap();
        let mut fleet = Fleet::new(fleet_config(vec![agent(walk_file(&dir), 0)]));
        fleet.start().await.unwrap();
        assert!(fleet.is_running());
        fleet.stop();
        assert!(!fleet.is_running());
    }
}
