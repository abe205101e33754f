//! Agent assembly: one walk + one device = one answering SNMP endpoint
//!
//! The assembler reads the walk once, builds the per-context binding maps
//! (applying the device's modifiers along the way), extracts subtree roots
//! and registers one managed-object group per root with the agent's engine.
//! A registration collision degrades to per-OID single-entry groups instead
//! of failing the agent.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::device::Device;
use crate::modifier::Modifier;
use crate::snmp::engine::{self, MoServer, WORKER_POOL_SIZE};
use crate::snmp::oid::Oid;
use crate::snmp::persist;
use crate::snmp::vacm::AccessControl;
use crate::store::group::{MoGroup, StoredVariable};
use crate::store::modified::ModifiedVariable;
use crate::store::roots::extract_roots;
use crate::store::walk::{self, WalkBindings};
use crate::Result;

/// Build the bindings `context` serves from the raw walk, applying the
/// device's modifiers per OID: untouched pass-through, a modifier-wrapped
/// variable, or a community-context expansion replacing the original.
pub fn build_context_bindings(
    raw: &WalkBindings,
    device: &Device,
    context: &str,
) -> BTreeMap<Oid, StoredVariable> {
    let mut bindings = BTreeMap::new();
    for (oid, variable) in raw {
        let modifiers = device.modifiers_for(oid);
        if modifiers.is_empty() {
            bindings.insert(oid.clone(), StoredVariable::Static(variable.clone()));
            continue;
        }
        if let Some(expander) = modifiers.iter().find_map(|m| m.as_community_context()) {
            for (expanded, value) in expander.expand(context, oid, variable) {
                bindings.insert(expanded, StoredVariable::Static(value));
            }
            continue;
        }
        let owned: Vec<Modifier> = modifiers.into_iter().cloned().collect();
        bindings.insert(
            oid.clone(),
            StoredVariable::Modified(ModifiedVariable::new(variable.clone(), owned)),
        );
    }
    bindings
}

fn context_tag(context: &str) -> Option<&str> {
    if context.is_empty() {
        None
    } else {
        Some(context)
    }
}

/// Register `bindings` into `context`, one group per extracted root.
/// Returns the number of groups actually registered; collisions fall back
/// to per-OID groups and conflicting leaves are skipped with a warning.
pub fn register_context(
    server: &MoServer,
    context: &str,
    mut bindings: BTreeMap<Oid, StoredVariable>,
) -> usize {
    if bindings.is_empty() {
        return 0;
    }
    let oids: Vec<Oid> = bindings.keys().cloned().collect();
    let mut registered = 0;

    for root in extract_roots(&oids) {
        // Carve the root's slice out of the remaining bindings.
        let mut subtree = bindings.split_off(&root);
        let rest = subtree.split_off(&root.next_peer());
        bindings.extend(rest);

        let group = MoGroup::new(root.clone(), context_tag(context), subtree.clone());
        match server.register(context, Arc::new(group)) {
            Ok(()) => registered += 1,
            Err(e) => {
                warn!(
                    %root,
                    context,
                    "Subtree registration failed ({}), falling back to per-OID groups", e
                );
                for (oid, stored) in subtree {
                    let single = MoGroup::single(oid.clone(), stored, context_tag(context));
                    match server.register(context, Arc::new(single)) {
                        Ok(()) => registered += 1,
                        Err(conflict) => {
                            warn!(%oid, context, "Skipping conflicting registration: {}", conflict);
                        }
                    }
                }
            }
        }
    }
    registered
}

/// The VACM setup every agent gets: full read/write for its community
/// strings in every context, plus the static SNMPv3 user profiles.
fn build_access_control(community: &str, vlans: &[u64]) -> AccessControl {
    let full = Oid::new(vec![1, 3]);
    let system = Oid::new(vec![1, 3, 6, 1, 2, 1, 1]);

    let mut access = AccessControl::new();
    access.add_view("fullReadView", full.clone());
    access.add_view("fullWriteView", full.clone());
    access.add_view("fullNotifyView", full);
    access.add_view("restrictedReadView", system.clone());
    access.add_view("restrictedNotifyView", system);

    let mut communities: Vec<String> = vec![community.to_string()];
    communities.extend(vlans.iter().map(|vlan| format!("{}@{}", community, vlan)));
    let names: Vec<&str> = communities.iter().map(String::as_str).collect();
    access.add_group(
        "v1v2cGroup",
        &names,
        Some("fullReadView"),
        Some("fullWriteView"),
    );

    access.add_group("restrictedGroup", &["SHADES"], Some("restrictedReadView"), None);
    access.add_group(
        "testGroup",
        &["TEST", "SHA"],
        Some("fullReadView"),
        Some("fullWriteView"),
    );
    access.add_group("notifyGroup", &["v3notify"], Some("restrictedNotifyView"), None);
    access
}

/// Populate an agent's engine from its walk and device: context binding
/// maps, group registration, community strings and access control. Returns
/// the number of groups registered across all contexts. A missing walk file
/// is fatal for this agent.
pub fn assemble(config: &AgentConfig, device: &Device, server: &MoServer) -> Result<usize> {
    let raw = walk::parse_file(&config.walk)?;
    let contexts = device.contexts();

    // Clear the engine's auto-installed defaults before ours go in.
    for context in &contexts {
        server.unregister_all(context);
    }

    let mut groups = 0;
    for context in &contexts {
        let bindings = build_context_bindings(&raw, device, context);
        groups += register_context(server, context, bindings);
    }

    server.register_community(&config.community, "");
    for vlan in &device.vlans {
        server.register_community(
            &format!("{}@{}", config.community, vlan),
            &vlan.to_string(),
        );
    }
    server.set_access_control(build_access_control(&config.community, &device.vlans));

    info!(
        agent = %config.name(),
        walk_oids = raw.len(),
        contexts = contexts.len(),
        groups, "Agent assembled"
    );
    Ok(groups)
}

/// One running virtual agent: engine, bound socket and worker pool.
pub struct Agent {
    config: AgentConfig,
    device: Arc<Device>,
    server: Arc<MoServer>,
    socket: Option<Arc<UdpSocket>>,
    workers: Vec<JoinHandle<()>>,
}

impl Agent {
    pub fn new(config: AgentConfig, device: Arc<Device>) -> Self {
        Self {
            config,
            device,
            server: Arc::new(MoServer::new()),
            socket: None,
            workers: Vec::new(),
        }
    }

    pub fn name(&self) -> String {
        self.config.name()
    }

    pub fn server(&self) -> Arc<MoServer> {
        Arc::clone(&self.server)
    }

    /// The endpoint actually bound, once started. Differs from the config
    /// when port 0 asked the OS to pick.
    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Assemble, persist the boot files and start serving. Failure to bind
    /// is the one fatal outcome the fleet escalates into a nonzero exit.
    pub async fn start(&mut self) -> Result<()> {
        assemble(&self.config, &self.device, &self.server)?;

        let name = self.config.name();
        let walk_dir = self
            .config
            .walk
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let boot_count =
            match persist::increment_boot_counter(&persist::boot_counter_path(walk_dir, &name)) {
                Ok(count) => count,
                Err(e) => {
                    warn!(agent = %name, "Cannot persist boot counter: {}", e);
                    1
                }
            };
        if let Err(e) = persist::write_engine_config(
            &persist::engine_config_path(walk_dir, &name),
            &persist::EngineConfig {
                agent: name.clone(),
                address: self.config.address(),
                boot_count,
            },
        ) {
            warn!(agent = %name, "Cannot persist engine config: {}", e);
        }

        let socket = engine::bind_endpoint(&self.config.ip, self.config.port).await?;
        self.workers = engine::spawn_workers(
            Arc::clone(&socket),
            Arc::clone(&self.server),
            WORKER_POOL_SIZE,
        );
        self.socket = Some(socket);
        info!(agent = %self.name(), boots = boot_count, "Agent started");
        Ok(())
    }

    pub fn stop(&mut self) {
        for worker in self.workers.drain(..) {
            worker.abort();
        }
        self.socket = None;
    }

    pub fn is_running(&self) -> bool {
        self.socket.is_some()
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifier::ModifierProperties;
    use crate::snmp::codec::{self, Pdu, PduType, SnmpMessage, SnmpVersion};
    use crate::snmp::value::{Variable, VariableBinding};
    use std::io::Write;
    use std::path::PathBuf;

    fn oid(s: &str) -> Oid {
        s.parse().unwrap()
    }

    fn device_with(vlans: Vec<u64>, modifiers: Vec<(&str, &str, &str)>) -> Device {
        Device {
            name: "test".to_string(),
            vlans,
            modifiers: modifiers
                .into_iter()
                .map(|(prefix, class, props)| crate::device::ModifierBinding {
                    prefix: oid(prefix),
                    modifier: Modifier::from_config(
                        class,
                        &ModifierProperties::new(serde_yaml::from_str(props).unwrap()),
                    )
                    .unwrap(),
                })
                .collect(),
        }
    }

    fn raw_walk() -> WalkBindings {
        walk::parse_str(
            "\
.1.3.6.1.2.1.1.1.0 = STRING: \"edge\"
.1.3.6.1.2.1.1.9.0 = INTEGER: 5
.1.3.6.1.2.1.2.2.1.10.1 = Counter32: 99
.1.3.6.1.2.1.17.1.4.1.2.1 = Gauge32: 1
",
        )
    }

    #[test]
    fn test_bindings_pass_through_without_modifiers() {
        let device = device_with(vec![], vec![]);
        let bindings = build_context_bindings(&raw_walk(), &device, "");
        assert_eq!(bindings.len(), 4);
        assert!(matches!(
            bindings[&oid("1.3.6.1.2.1.1.1.0")],
            StoredVariable::Static(_)
        ));
    }

    #[test]
    fn test_bindings_wrap_modified_oids() {
        let device = device_with(
            vec![],
            vec![(
                "1.3.6.1.2.1.2.2.1.10",
                "counter32",
                "{minimumStep: 1, maximumStep: 1}",
            )],
        );
        let bindings = build_context_bindings(&raw_walk(), &device, "");
        match &bindings[&oid("1.3.6.1.2.1.2.2.1.10.1")] {
            StoredVariable::Modified(modified) => {
                assert_eq!(modified.peek(), &Variable::Counter32(99));
            }
            other => panic!("expected modified variable, got {:?}", other),
        }
        assert!(matches!(
            bindings[&oid("1.3.6.1.2.1.1.1.0")],
            StoredVariable::Static(_)
        ));
    }

    #[test]
    fn test_community_context_expansion_replaces_original() {
        let device = device_with(
            vec![10],
            vec![("1.3.6.1.2.1.17", "communitycontext", "{}")],
        );
        // Default context: the bridge OID disappears.
        let bindings = build_context_bindings(&raw_walk(), &device, "");
        assert!(!bindings.contains_key(&oid("1.3.6.1.2.1.17.1.4.1.2.1")));
        // VLAN context: expanded to the VLAN-derived value.
        let bindings = build_context_bindings(&raw_walk(), &device, "10");
        match &bindings[&oid("1.3.6.1.2.1.17.1.4.1.2.1")] {
            StoredVariable::Static(value) => assert_eq!(value, &Variable::UInt32(10)),
            other => panic!("expected static expansion, got {:?}", other),
        }
    }

    #[test]
    fn test_register_context_splits_roots() {
        let server = MoServer::new();
        server.unregister_all("");
        let device = device_with(vec![], vec![]);
        let registered = register_context(
            &server,
            "",
            build_context_bindings(&raw_walk(), &device, ""),
        );
        assert_eq!(registered, server.registered_count(""));
        assert!(registered >= 1);
    }

    #[test]
    fn test_register_context_falls_back_per_oid() {
        let server = MoServer::new();
        server.unregister_all("");
        // Occupy a subtree that will collide with the walk's single root.
        let occupying = MoGroup::single(
            oid("1.3.6.1.2.1.1.1.0"),
            StoredVariable::Static(Variable::Integer32(0)),
            None,
        );
        server.register("", Arc::new(occupying)).unwrap();

        let device = device_with(vec![], vec![]);
        let registered = register_context(
            &server,
            "",
            build_context_bindings(&raw_walk(), &device, ""),
        );
        // The occupied OID is skipped, the rest arrive as single groups.
        assert_eq!(registered, 3);
        assert_eq!(server.registered_count(""), 4);
    }

    #[test]
    fn test_empty_walk_registers_nothing() {
        let server = MoServer::new();
        server.unregister_all("");
        assert_eq!(register_context(&server, "", BTreeMap::new()), 0);
        assert_eq!(server.registered_count(""), 0);
    }

    fn write_walk(dir: &Path, content: &str) -> PathBuf {
        let path = dir.join("agent.walk");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn agent_config(walk: PathBuf, ip: &str, port: u16, community: &str) -> AgentConfig {
        AgentConfig {
            name: Some("test agent".to_string()),
            device: None,
            walk,
            ip: ip.to_string(),
            port,
            community: community.to_string(),
        }
    }

    #[test]
    fn test_assemble_vlan_contexts_and_communities() {
        let dir = tempfile::tempdir().unwrap();
        let walk = write_walk(dir.path(), ".1.3.6.1.2.1.1.1.0 = STRING: \"x\"\n");
        let config = agent_config(walk, "127.0.0.1", 16100, "myCom");
        let device = device_with(vec![10, 20], vec![]);
        let server = MoServer::new();

        let groups = assemble(&config, &device, &server).unwrap();
        assert_eq!(groups, 3);
        assert_eq!(server.context_of("myCom").as_deref(), Some(""));
        assert_eq!(server.context_of("myCom@10").as_deref(), Some("10"));
        assert_eq!(server.context_of("myCom@20").as_deref(), Some("20"));
        assert!(server.context_of("myCom@30").is_none());
    }

    #[test]
    fn test_assemble_missing_walk_is_fatal() {
        let config = agent_config(PathBuf::from("/nonexistent.walk"), "127.0.0.1", 0, "public");
        let device = device_with(vec![], vec![]);
        let server = MoServer::new();
        assert!(assemble(&config, &device, &server).is_err());
    }

    async fn started_agent(walk_body: &str, community: &str, vlans: Vec<u64>) -> (Agent, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let walk = write_walk(dir.path(), walk_body);
        let config = agent_config(walk, "127.0.0.1", 0, community);
        let mut agent = Agent::new(config, Arc::new(device_with(vlans, vec![])));
        agent.start().await.unwrap();
        (agent, dir)
    }

    async fn exchange(addr: std::net::SocketAddr, message: &SnmpMessage) -> SnmpMessage {
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client
            .send_to(&codec::encode_message(message), addr)
            .await
            .unwrap();
        let mut buffer = vec![0u8; 65_507];
        let (len, _) = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            client.recv_from(&mut buffer),
        )
        .await
        .unwrap()
        .unwrap();
        codec::decode_message(&buffer[..len]).unwrap()
    }

    fn wire_request(pdu_type: PduType, community: &str, target: &str) -> SnmpMessage {
        SnmpMessage {
            version: SnmpVersion::V2c,
            community: community.as_bytes().to_vec(),
            pdu: Pdu {
                pdu_type,
                request_id: 99,
                error_status: 0,
                error_index: 0,
                bindings: vec![VariableBinding::new(oid(target), Variable::Null)],
            },
        }
    }

    #[tokio::test]
    async fn test_udp_get_and_getnext_end_to_end() {
        let (mut agent, _dir) = started_agent(
            ".1.3.6.1.2.1.1.1.0 = STRING: \"x\"\n",
            "public",
            vec![],
        )
        .await;
        let addr = agent.local_addr().unwrap();

        // The boot files land beside the walk, named after the URL-encoded
        // agent name.
        assert!(_dir.path().join("test%20agent.BC.cfg").exists());
        assert!(_dir.path().join("test%20agent.Config.cfg").exists());

        let reply = exchange(
            addr,
            &wire_request(PduType::GetRequest, "public", "1.3.6.1.2.1.1.1.0"),
        )
        .await;
        assert_eq!(reply.pdu.request_id, 99);
        assert_eq!(reply.pdu.bindings[0].variable, Variable::octet_string("x"));

        // GETNEXT past the single OID runs off the end of the MIB view.
        let reply = exchange(
            addr,
            &wire_request(PduType::GetNextRequest, "public", "1.3.6.1.2.1.1.1.0"),
        )
        .await;
        assert_eq!(reply.pdu.bindings[0].variable, Variable::EndOfMibView);
        agent.stop();
    }

    #[tokio::test]
    async fn test_udp_getnext_descends_into_subtree() {
        let (mut agent, _dir) = started_agent(
            ".1.3.6.1.2.1.1.1.0 = STRING: \"x\"\n.1.3.6.1.2.1.2.1.0 = INTEGER: 3\n",
            "public",
            vec![],
        )
        .await;
        let addr = agent.local_addr().unwrap();

        let reply = exchange(
            addr,
            &wire_request(PduType::GetNextRequest, "public", "1.3.6.1.2.1.1"),
        )
        .await;
        assert_eq!(reply.pdu.bindings[0].oid, oid("1.3.6.1.2.1.1.1.0"));
        assert_eq!(reply.pdu.bindings[0].variable, Variable::octet_string("x"));
        agent.stop();
    }

    #[tokio::test]
    async fn test_udp_vlan_communities_select_contexts() {
        let (mut agent, _dir) = started_agent(
            ".1.3.6.1.2.1.1.1.0 = STRING: \"x\"\n",
            "myCom",
            vec![10],
        )
        .await;
        let addr = agent.local_addr().unwrap();

        let reply = exchange(
            addr,
            &wire_request(PduType::GetRequest, "myCom@10", "1.3.6.1.2.1.1.1.0"),
        )
        .await;
        assert_eq!(reply.pdu.bindings[0].variable, Variable::octet_string("x"));
        agent.stop();
    }
}
