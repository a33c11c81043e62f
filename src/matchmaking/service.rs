//! Lobby service - owns presence and the battle table, dispatches client events

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{DisconnectPolicy, LobbyRules};
use crate::game::{
    BattlePhase, BattleTable, Board, MatchId, OutcomeReporter, ReadyOutcome, ShotOutcome, UserId,
};
use crate::store::UserStore;
use crate::ws::protocol::{AcceptGame, ClientMsg, ServerMsg};

use super::broker::MatchmakingBroker;
use super::presence::{ConnectionHandle, ConnectionId, PresenceRegistry};

/// The match coordinator. Constructed once at startup; every connection
/// handler holds a reference to it.
pub struct LobbyService {
    rules: LobbyRules,
    presence: Arc<PresenceRegistry>,
    battles: Arc<BattleTable>,
    broker: MatchmakingBroker,
    reporter: OutcomeReporter,
}

impl LobbyService {
    pub fn new(rules: LobbyRules, store: Arc<dyn UserStore>) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let battles = Arc::new(BattleTable::new());
        let broker = MatchmakingBroker::new(presence.clone(), battles.clone(), rules.require_invite);
        let reporter = OutcomeReporter::new(presence.clone(), store);

        Self {
            rules,
            presence,
            battles,
            broker,
            reporter,
        }
    }

    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    pub fn active_matches(&self) -> usize {
        self.battles.active_battles()
    }

    /// Admit a new session and push the presence list to everyone,
    /// the new session included
    pub fn connect(&self, user_id: UserId, handle: ConnectionHandle) {
        let connection_id = handle.id;
        let first = self.presence.admit(user_id, handle);
        info!(
            user_id,
            connection_id = %connection_id,
            first_session = first,
            "Connection admitted"
        );
        self.presence.broadcast_presence();
    }

    /// Session closed by the transport
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let Some(removed) = self.presence.remove(connection_id) else {
            return;
        };
        info!(
            user_id = removed.user_id,
            connection_id = %connection_id,
            offline = removed.went_offline,
            "Connection removed"
        );
        self.presence.broadcast_presence();

        if removed.went_offline {
            self.user_left(removed.user_id).await;
        }
    }

    /// Route one inbound event from `user_id`
    pub async fn handle(&self, user_id: UserId, msg: ClientMsg) {
        match msg {
            ClientMsg::InviteGame(target) => {
                self.broker.invite(user_id, target);
            }
            ClientMsg::AcceptGame(AcceptGame { from, to }) => {
                self.broker.accept(user_id, from, to);
            }
            ClientMsg::PlayerReady(ready) => {
                self.player_ready(user_id, &ready.game_id, ready.board);
            }
            ClientMsg::Shoot(shot) => {
                self.shoot(user_id, &shot.game_id, shot.x, shot.y).await;
            }
            ClientMsg::Logout(target) => {
                self.logout(user_id, target).await;
            }
        }
    }

    /// Store a board; on the second one, open fire
    pub fn player_ready(&self, user_id: UserId, game_id: &MatchId, board: Board) {
        let Some(handle) = self.battles.get(game_id) else {
            debug!(user_id, game_id = %game_id, "Board for unknown match, ignoring");
            return;
        };
        let mut battle = handle.lock();

        match battle.submit_board(user_id, board, self.rules.first_turn) {
            ReadyOutcome::Ignored => {
                debug!(user_id, game_id = %game_id, "Board not accepted, ignoring");
            }
            ReadyOutcome::Waiting => {
                info!(user_id, game_id = %game_id, "Player ready");
            }
            ReadyOutcome::CombatStarted { first } => {
                let (a, b) = battle.players();
                for (me, enemy) in [(a, b), (b, a)] {
                    let enemy_board = battle.board_of(enemy).cloned().unwrap_or_default();
                    self.presence.send_to(
                        me,
                        &ServerMsg::BattleStart {
                            enemy_board,
                            my_turn: me == first,
                            game_id: game_id.clone(),
                            opponent_id: enemy,
                        },
                    );
                }
                info!(game_id = %game_id, first_turn = first, "Battle started");
            }
        }
    }

    /// Resolve a shot. Anything other than the current player's shot in a
    /// running battle is dropped.
    pub async fn shoot(&self, user_id: UserId, game_id: &MatchId, x: usize, y: usize) {
        let Some(handle) = self.battles.get(game_id) else {
            debug!(user_id, game_id = %game_id, "Shot for unknown match, ignoring");
            return;
        };

        let outcome = {
            let mut battle = handle.lock();
            let Some(outcome) = battle.shoot(user_id, x, y) else {
                return;
            };

            if let ShotOutcome::Resolved { hit, next_turn } = outcome {
                let result = ServerMsg::ShotResult {
                    x,
                    y,
                    hit,
                    shooter: user_id,
                    next_turn,
                };
                let (a, b) = battle.players();
                for player in [a, b] {
                    self.presence.send_to(player, &result);
                }
            }
            outcome
        };

        // The battle is already terminal, so nothing can mutate it while the
        // store is being updated
        if let ShotOutcome::Finished { winner, loser } = outcome {
            self.battles.remove(game_id);
            self.reporter.report(game_id, winner, loser).await;
        }
    }

    /// Close every session of the sender. Logging out someone else is ignored.
    pub async fn logout(&self, sender: UserId, target: UserId) {
        if sender != target {
            warn!(sender, target, "Logout for another identity, ignoring");
            return;
        }

        let closed = self.presence.force_disconnect(target);
        if closed == 0 {
            return;
        }
        info!(user_id = target, sessions = closed, "User logged out");
        self.presence.broadcast_presence();
        self.user_left(target).await;
    }

    /// The identity has no live sessions left
    async fn user_left(&self, user_id: UserId) {
        self.broker.drop_invites(user_id);
        if self.rules.disconnect_policy == DisconnectPolicy::Forfeit {
            self.forfeit(user_id).await;
        }
    }

    /// End the identity's match in the opponent's favour. Skipped when the
    /// identity has reconnected since its last session dropped.
    async fn forfeit(&self, user_id: UserId) {
        if self.presence.is_connected(user_id) {
            debug!(user_id, "Reconnected before forfeit, keeping match");
            return;
        }
        let Some(game_id) = self.presence.match_of(user_id) else {
            return;
        };
        let Some(handle) = self.battles.get(&game_id) else {
            self.reporter.release(&game_id, user_id);
            return;
        };

        let (phase, opponent) = {
            let mut battle = handle.lock();
            let phase = battle.phase();
            if phase == BattlePhase::Finished {
                return;
            }
            battle.finish();
            (phase, battle.opponent_of(user_id))
        };
        self.battles.remove(&game_id);

        let Some(opponent) = opponent else {
            self.reporter.release(&game_id, user_id);
            return;
        };

        match phase {
            BattlePhase::AwaitingBoards => {
                info!(game_id = %game_id, user_id, "Match cancelled, player left before battle");
                self.presence.send_to(
                    opponent,
                    &ServerMsg::GameCancelled {
                        game_id: game_id.clone(),
                    },
                );
                self.reporter.release(&game_id, user_id);
                self.reporter.release(&game_id, opponent);
            }
            BattlePhase::InCombat => {
                info!(game_id = %game_id, user_id, "Player left mid-battle, forfeiting");
                self.reporter.report(&game_id, opponent, user_id).await;
            }
            BattlePhase::Finished => {}
        }
    }
}
