//! Outcome reporting - announce the winner, release both players, credit stats

use std::sync::Arc;
use tracing::{error, info, warn};

use crate::matchmaking::presence::PresenceRegistry;
use crate::store::{StoreError, UserStore};
use crate::ws::protocol::ServerMsg;

use super::{MatchId, UserId};

pub struct OutcomeReporter {
    presence: Arc<PresenceRegistry>,
    store: Arc<dyn UserStore>,
}

impl OutcomeReporter {
    pub fn new(presence: Arc<PresenceRegistry>, store: Arc<dyn UserStore>) -> Self {
        Self { presence, store }
    }

    /// Finish a match. The announcement goes out before the store is
    /// touched, and a store failure does not take it back.
    pub async fn report(&self, game_id: &MatchId, winner: UserId, loser: UserId) {
        info!(game_id = %game_id, winner, loser, "Match finished");

        self.announce(game_id, winner, loser);
        self.record(game_id, winner, loser).await;
    }

    /// Notify both players and put them back to idle presence
    pub fn announce(&self, game_id: &MatchId, winner: UserId, loser: UserId) {
        let finished = ServerMsg::GameFinished { winner_id: winner };
        for user_id in [winner, loser] {
            self.presence.send_to(user_id, &finished);
        }
        self.release(game_id, winner);
        self.release(game_id, loser);
    }

    /// Drop a player's binding to `game_id` and broadcast the new status
    pub fn release(&self, game_id: &MatchId, user_id: UserId) {
        if self.presence.unbind_from(user_id, game_id) {
            self.presence.announce_status(user_id);
        }
    }

    /// Credit the win and the loss. Failures are logged, never retried.
    pub async fn record(&self, game_id: &MatchId, winner: UserId, loser: UserId) {
        let (win, loss) = futures::join!(
            self.store.increment_win(winner),
            self.store.increment_loss(loser)
        );

        log_store_result(game_id, winner, "win", win);
        log_store_result(game_id, loser, "loss", loss);
    }
}

fn log_store_result(game_id: &MatchId, user_id: UserId, stat: &str, result: Result<(), StoreError>) {
    match result {
        Ok(()) => {}
        Err(StoreError::NotFound(_)) => {
            warn!(game_id = %game_id, user_id, stat, "No user record to credit");
        }
        Err(e) => {
            error!(game_id = %game_id, user_id, stat, error = %e, "Failed to record match result");
        }
    }
}
