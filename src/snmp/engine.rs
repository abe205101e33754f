//! SNMP engine: registry, community routing, PDU dispatch and serve loop
//!
//! The engine owns everything between a UDP datagram and the managed-object
//! callbacks: decoding, community→context resolution, access control, the
//! per-PDU dispatch including two-phase-commit orchestration for SET, and
//! the worker tasks that pump one agent's socket.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::codec::{self, Pdu, PduType, SnmpMessage, SnmpVersion};
use super::oid::Oid;
use super::scope::{ErrorStatus, ManagedObject, SubRequest};
use super::vacm::AccessControl;
use super::value::{Variable, VariableBinding};
use crate::store::group::{MoGroup, StoredVariable};
use crate::{Error, Result, NAME, VERSION};

/// Request handlers per agent.
pub const WORKER_POOL_SIZE: usize = 3;

const MAX_DATAGRAM: usize = 65_507;
const MAX_BULK_BINDINGS: usize = 4096;
/// GETNEXT candidates rejected by the view filter before giving up.
const MAX_VIEW_SKIPS: usize = 128;

/// Managed-object registry plus community table for one virtual agent.
///
/// Registrations are mutated only during startup/shutdown; request dispatch
/// takes read locks.
pub struct MoServer {
    contexts: RwLock<HashMap<String, Vec<Arc<dyn ManagedObject>>>>,
    communities: RwLock<HashMap<String, String>>,
    access: RwLock<AccessControl>,
}

impl Default for MoServer {
    fn default() -> Self {
        Self::new()
    }
}

impl MoServer {
    /// A fresh engine with the stock system group installed in the default
    /// context. Agents replace it with walk-backed groups at assembly time.
    pub fn new() -> Self {
        let server = Self {
            contexts: RwLock::new(HashMap::new()),
            communities: RwLock::new(HashMap::new()),
            access: RwLock::new(AccessControl::new()),
        };
        server.seed_default_mib("");
        server
    }

    /// Install the engine's built-in system group into `context`.
    pub fn seed_default_mib(&self, context: &str) {
        let root = Oid::new(vec![1, 3, 6, 1, 2, 1, 1]);
        let mut bindings = std::collections::BTreeMap::new();
        bindings.insert(
            root.child(1).child(0),
            StoredVariable::Static(Variable::octet_string(&format!(
                "{} virtual agent v{}",
                NAME, VERSION
            ))),
        );
        bindings.insert(
            root.child(2).child(0),
            StoredVariable::Static(Variable::Oid(Oid::new(vec![1, 3, 6, 1, 4, 1, 99999]))),
        );
        bindings.insert(
            root.child(3).child(0),
            StoredVariable::Static(Variable::TimeTicks(0)),
        );
        let tag = if context.is_empty() { None } else { Some(context) };
        let group = MoGroup::new(root, tag, bindings);
        // The context is empty at construction, so this cannot clash.
        let _ = self.register(context, Arc::new(group));
    }

    /// Register a managed object under `context`. Fails without touching the
    /// registry when its scope intersects an existing registration; callers
    /// fall back to per-OID registration on that error.
    pub fn register(&self, context: &str, mo: Arc<dyn ManagedObject>) -> Result<()> {
        let mut contexts = self.contexts.write().expect("registry lock");
        let registrations = contexts.entry(context.to_string()).or_default();
        let scope = mo.scope();
        if let Some(existing) = registrations
            .iter()
            .find(|registered| registered.scope().intersects(&scope))
        {
            return Err(Error::registration(format!(
                "Scope {} overlaps existing registration {} in context {:?}",
                scope,
                existing.scope(),
                context
            )));
        }
        registrations.push(mo);
        registrations.sort_by(|a, b| a.scope().lower.cmp(&b.scope().lower));
        Ok(())
    }

    /// Drop every registration in `context` (the engine-installed defaults,
    /// before an agent brings its own groups).
    pub fn unregister_all(&self, context: &str) {
        if let Some(registrations) = self
            .contexts
            .write()
            .expect("registry lock")
            .get_mut(context)
        {
            registrations.clear();
        }
    }

    pub fn registered_count(&self, context: &str) -> usize {
        self.contexts
            .read()
            .expect("registry lock")
            .get(context)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn register_community(&self, community: &str, context: &str) {
        self.communities
            .write()
            .expect("community lock")
            .insert(community.to_string(), context.to_string());
    }

    pub fn context_of(&self, community: &str) -> Option<String> {
        self.communities
            .read()
            .expect("community lock")
            .get(community)
            .cloned()
    }

    pub fn set_access_control(&self, access: AccessControl) {
        *self.access.write().expect("access lock") = access;
    }

    fn resolve(&self, context: &str, oid: &Oid) -> Option<Arc<dyn ManagedObject>> {
        let contexts = self.contexts.read().expect("registry lock");
        contexts
            .get(context)?
            .iter()
            .find(|mo| mo.scope().covers(oid))
            .cloned()
    }

    fn registrations(&self, context: &str) -> Vec<Arc<dyn ManagedObject>> {
        self.contexts
            .read()
            .expect("registry lock")
            .get(context)
            .cloned()
            .unwrap_or_default()
    }

    /// The binding lexicographically after `oid` in `context`, readable by
    /// `community`, or `None` past the end of the MIB view.
    fn next_binding(
        &self,
        context: &str,
        community: &str,
        oid: &Oid,
    ) -> Option<VariableBinding> {
        let access = self.access.read().expect("access lock");
        let mut cursor = oid.clone();
        for _ in 0..MAX_VIEW_SKIPS {
            let mut found = None;
            for mo in self.registrations(context) {
                if mo.scope().upper <= cursor {
                    continue;
                }
                let mut sub = SubRequest::new(cursor.clone());
                if mo.next(&mut sub) {
                    found = Some(sub.binding);
                    break;
                }
            }
            let binding = found?;
            if access.can_read(community, &binding.oid) {
                return Some(binding);
            }
            cursor = binding.oid;
        }
        None
    }

    /// Process one decoded request. `None` means drop (unknown community or
    /// a PDU an agent never answers).
    pub fn process(&self, request: SnmpMessage) -> Option<SnmpMessage> {
        let community = String::from_utf8_lossy(&request.community).to_string();
        let Some(context) = self.context_of(&community) else {
            debug!(%community, "Dropping request for unknown community");
            return None;
        };

        let pdu = &request.pdu;
        let response = match pdu.pdu_type {
            PduType::GetRequest => self.do_get(&context, &community, pdu),
            PduType::GetNextRequest => self.do_next(&context, &community, pdu),
            PduType::GetBulkRequest if request.version == SnmpVersion::V2c => {
                self.do_bulk(&context, &community, pdu)
            }
            PduType::GetBulkRequest => error_response(pdu, ErrorStatus::GenErr, 0),
            PduType::SetRequest => self.do_set(&context, &community, pdu),
            PduType::Response => return None,
        };
        let response = downgrade_for_v1(request.version, pdu, response);

        Some(SnmpMessage {
            version: request.version,
            community: request.community,
            pdu: response,
        })
    }

    fn do_get(&self, context: &str, community: &str, pdu: &Pdu) -> Pdu {
        let access = self.access.read().expect("access lock");
        let bindings = pdu
            .bindings
            .iter()
            .map(|binding| {
                if !access.can_read(community, &binding.oid) {
                    return VariableBinding::new(binding.oid.clone(), Variable::NoSuchObject);
                }
                match self.resolve(context, &binding.oid) {
                    Some(mo) => {
                        let mut sub = SubRequest::new(binding.oid.clone());
                        mo.get(&mut sub);
                        sub.binding
                    }
                    None => VariableBinding::new(binding.oid.clone(), Variable::NoSuchObject),
                }
            })
            .collect();
        response(pdu, bindings)
    }

    fn do_next(&self, context: &str, community: &str, pdu: &Pdu) -> Pdu {
        let bindings = pdu
            .bindings
            .iter()
            .map(|binding| {
                self.next_binding(context, community, &binding.oid)
                    .unwrap_or_else(|| {
                        VariableBinding::new(binding.oid.clone(), Variable::EndOfMibView)
                    })
            })
            .collect();
        response(pdu, bindings)
    }

    fn do_bulk(&self, context: &str, community: &str, pdu: &Pdu) -> Pdu {
        let non_repeaters = pdu.non_repeaters().min(pdu.bindings.len());
        let mut bindings = Vec::new();

        for binding in &pdu.bindings[..non_repeaters] {
            bindings.push(
                self.next_binding(context, community, &binding.oid)
                    .unwrap_or_else(|| {
                        VariableBinding::new(binding.oid.clone(), Variable::EndOfMibView)
                    }),
            );
        }

        let mut cursors: Vec<(Oid, bool)> = pdu.bindings[non_repeaters..]
            .iter()
            .map(|binding| (binding.oid.clone(), false))
            .collect();
        'rounds: for _ in 0..pdu.max_repetitions() {
            for (cursor, ended) in cursors.iter_mut() {
                if bindings.len() >= MAX_BULK_BINDINGS {
                    debug!("GETBULK truncated at {} bindings", MAX_BULK_BINDINGS);
                    break 'rounds;
                }
                if *ended {
                    bindings.push(VariableBinding::new(
                        cursor.clone(),
                        Variable::EndOfMibView,
                    ));
                    continue;
                }
                match self.next_binding(context, community, cursor) {
                    Some(binding) => {
                        *cursor = binding.oid.clone();
                        bindings.push(binding);
                    }
                    None => {
                        *ended = true;
                        bindings.push(VariableBinding::new(
                            cursor.clone(),
                            Variable::EndOfMibView,
                        ));
                    }
                }
            }
        }
        response(pdu, bindings)
    }

    fn do_set(&self, context: &str, community: &str, pdu: &Pdu) -> Pdu {
        let mut pairs: Vec<(Arc<dyn ManagedObject>, SubRequest)> = Vec::new();
        {
            let access = self.access.read().expect("access lock");
            for (index, binding) in pdu.bindings.iter().enumerate() {
                if !access.can_write(community, &binding.oid) {
                    return error_response(pdu, ErrorStatus::NoAccess, index as i32 + 1);
                }
                let Some(mo) = self.resolve(context, &binding.oid) else {
                    return error_response(pdu, ErrorStatus::NoCreation, index as i32 + 1);
                };
                pairs.push((
                    mo,
                    SubRequest::with_value(binding.oid.clone(), binding.variable.clone()),
                ));
            }
        }

        let mut failed: Option<(ErrorStatus, i32)> = None;
        for (index, (mo, sub)) in pairs.iter_mut().enumerate() {
            mo.prepare(sub);
            if sub.has_error() && failed.is_none() {
                failed = Some((sub.status, index as i32 + 1));
            }
        }

        if failed.is_none() {
            for (index, (mo, sub)) in pairs.iter_mut().enumerate() {
                mo.commit(sub);
                if sub.has_error() {
                    failed = Some((ErrorStatus::CommitFailed, index as i32 + 1));
                    break;
                }
            }
        }

        if let Some((status, index)) = failed {
            for (mo, sub) in pairs.iter_mut() {
                mo.undo(sub);
            }
            for (mo, sub) in pairs.iter_mut() {
                mo.cleanup(sub);
            }
            return error_response(pdu, status, index);
        }

        for (mo, sub) in pairs.iter_mut() {
            mo.cleanup(sub);
        }
        response(pdu, pdu.bindings.clone())
    }
}

fn response(request: &Pdu, bindings: Vec<VariableBinding>) -> Pdu {
    Pdu {
        pdu_type: PduType::Response,
        request_id: request.request_id,
        error_status: 0,
        error_index: 0,
        bindings,
    }
}

fn error_response(request: &Pdu, status: ErrorStatus, index: i32) -> Pdu {
    Pdu {
        pdu_type: PduType::Response,
        request_id: request.request_id,
        error_status: status.code(),
        error_index: index,
        bindings: request.bindings.clone(),
    }
}

/// SNMPv1 has no varbind exceptions: a response carrying one becomes a
/// `noSuchName` error echoing the request bindings.
fn downgrade_for_v1(version: SnmpVersion, request: &Pdu, mut response: Pdu) -> Pdu {
    if version != SnmpVersion::V1 {
        return response;
    }
    if let Some(position) = response
        .bindings
        .iter()
        .position(|binding| binding.variable.is_exception())
    {
        response.error_status = ErrorStatus::NoSuchName.code();
        response.error_index = position as i32 + 1;
        response.bindings = request.bindings.clone();
    }
    response
}

/// Spawn the worker pool for one bound agent socket. Each worker receives,
/// dispatches and answers datagrams independently.
pub fn spawn_workers(
    socket: Arc<UdpSocket>,
    server: Arc<MoServer>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    (0..workers)
        .map(|worker| {
            let socket = Arc::clone(&socket);
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let mut buffer = vec![0u8; MAX_DATAGRAM];
                loop {
                    let (len, peer) = match socket.recv_from(&mut buffer).await {
                        Ok(received) => received,
                        Err(e) => {
                            warn!(worker, "Error receiving datagram: {}", e);
                            continue;
                        }
                    };
                    match codec::decode_message(&buffer[..len]) {
                        Ok(request) => {
                            if let Some(reply) = server.process(request) {
                                let datagram = codec::encode_message(&reply);
                                if let Err(e) = socket.send_to(&datagram, peer).await {
                                    warn!(worker, %peer, "Error sending response: {}", e);
                                }
                            }
                        }
                        Err(e) => {
                            debug!(worker, %peer, "Dropping undecodable datagram: {}", e);
                        }
                    }
                }
            })
        })
        .collect()
}

/// Bind an agent's UDP endpoint. Accepts IPv4 and IPv6 literals.
pub async fn bind_endpoint(ip: &str, port: u16) -> Result<Arc<UdpSocket>> {
    let address: std::net::IpAddr = ip
        .parse()
        .map_err(|_| Error::network(format!("Invalid bind address {:?}", ip)))?;
    let socket = UdpSocket::bind((address, port))
        .await
        .map_err(|e| Error::network(format!("Failed to bind {}/{}: {}", ip, port, e)))?;
    info!("Listening on {}/{}", ip, port);
    Ok(Arc::new(socket))
}
