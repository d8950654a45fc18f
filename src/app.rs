use std::sync::Arc;
use std::time::Duration;

use crate::engine::ConsensusEngine;
use crate::gateway::WriteGateway;
use crate::membership::MembershipController;
use crate::store::StateMachineStore;
use crate::NodeId;

// Representation of an application state. This struct can be shared around to share
// the consensus engine, the state machine and the services built on them.
pub struct App {
    pub id: NodeId,
    pub addr: String,
    pub state_machine_store: Arc<StateMachineStore>,
    pub gateway: WriteGateway,
    pub membership: MembershipController,
}

impl App {
    pub fn new(
        addr: String,
        engine: Arc<dyn ConsensusEngine>,
        state_machine_store: Arc<StateMachineStore>,
        write_timeout: Duration,
    ) -> Self {
        Self {
            id: engine.node_id(),
            addr,
            state_machine_store,
            gateway: WriteGateway::new(engine.clone(), write_timeout),
            membership: MembershipController::new(engine),
        }
    }
}
