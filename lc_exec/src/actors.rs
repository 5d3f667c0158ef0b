//! # Actor registry
//!
//! Every actor the harness spawns is recorded here so that it can be destroyed when the harness
//! exits, whatever the reason for exiting.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{info, warn};

use comms_if::sim::ActorId;
use crate::sim_client::{SimClient, SimLink};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// The actors spawned by the harness, in spawn order.
#[derive(Debug, Default)]
pub struct ActorRegistry {
    actors: Vec<(String, ActorId)>
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ActorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly spawned actor.
    pub fn register(&mut self, name: &str, id: ActorId) -> ActorId {
        self.actors.push((name.to_string(), id));
        id
    }

    /// Forget an actor that has already been destroyed.
    pub fn remove(&mut self, id: ActorId) {
        self.actors.retain(|(_, a)| *a != id);
    }

    pub fn contains(&self, id: ActorId) -> bool {
        self.actors.iter().any(|(_, a)| *a == id)
    }

    pub fn len(&self) -> usize {
        self.actors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actors.is_empty()
    }

    /// Destroy every registered actor.
    ///
    /// Failures are logged and do not stop the remaining actors being destroyed. Returns the
    /// number of actors which were destroyed successfully.
    pub fn destroy_all<L: SimLink>(&mut self, client: &mut SimClient<L>) -> usize {
        info!("Destroying {} actors", self.actors.len());

        let mut num_destroyed = 0;

        for (name, id) in self.actors.drain(..) {
            match client.destroy_actor(id) {
                Ok(()) => num_destroyed += 1,
                Err(e) => warn!("Could not destroy {} ({:?}): {}", name, id, e)
            }
        }

        num_destroyed
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim_client::fake;
    use comms_if::sim::{SimRequest, SimResponse};

    #[test]
    fn test_destroy_all_continues_after_failure() {
        let mut client = fake::client(|req| match req {
            SimRequest::DestroyActor(ActorId(2)) => SimResponse::Error("already gone".into()),
            _ => SimResponse::Ok
        });

        let mut reg = ActorRegistry::new();
        reg.register("vehicle", ActorId(1));
        reg.register("camera", ActorId(2));
        reg.register("top_camera", ActorId(3));

        assert_eq!(reg.destroy_all(&mut client), 2);
        assert!(reg.is_empty());

        assert_eq!(client.link().requests, vec![
            SimRequest::DestroyActor(ActorId(1)),
            SimRequest::DestroyActor(ActorId(2)),
            SimRequest::DestroyActor(ActorId(3)),
        ]);
    }

    #[test]
    fn test_remove() {
        let mut reg = ActorRegistry::new();
        reg.register("vehicle", ActorId(1));
        reg.register("obstacle", ActorId(9));

        reg.remove(ActorId(9));

        assert!(!reg.contains(ActorId(9)));
        assert!(reg.contains(ActorId(1)));
        assert_eq!(reg.len(), 1);
    }
}
