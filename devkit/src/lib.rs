/*!
# Fleet DevKit - fakes and harness for the fleet kernel

- Scripted SSH connector (per-address outcomes, session counters)
- Scripted agent client (answer, hang, refuse, answer empty)
- In-memory inventory with failure injection, scripted workflow checker
- `TestHarness` assembling a `HostService` from all of the above
*/

pub mod agent_stub;
pub mod ssh_stub;
pub mod store_stub;
pub mod test_utils;

pub use agent_stub::{AgentScript, ScriptedAgentClient};
pub use ssh_stub::{Script, ScriptedConnector};
pub use store_stub::{MemoryInventoryStore, ScriptedWorkflows};
pub use test_utils::{candidate, FixedKeys, TestHarness, OWNER};
