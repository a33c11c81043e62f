//! Invite / accept handshake that pairs two online identities into a match

use dashmap::DashSet;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::game::{Battle, BattleTable, MatchId, UserId};
use crate::ws::protocol::ServerMsg;

use super::presence::PresenceRegistry;

pub struct MatchmakingBroker {
    presence: Arc<PresenceRegistry>,
    battles: Arc<BattleTable>,
    next_id: AtomicU64,
    /// Delivered invites, `(from, to)`
    pending: DashSet<(UserId, UserId)>,
    /// Held across the binding check and the bind itself
    pairing: Mutex<()>,
    require_invite: bool,
}

impl MatchmakingBroker {
    pub fn new(presence: Arc<PresenceRegistry>, battles: Arc<BattleTable>, require_invite: bool) -> Self {
        Self {
            presence,
            battles,
            next_id: AtomicU64::new(1),
            pending: DashSet::new(),
            pairing: Mutex::new(()),
            require_invite,
        }
    }

    /// Forward an invite to every session of `to`. Dropped silently when
    /// `to` is offline. Returns whether it was delivered anywhere.
    pub fn invite(&self, from: UserId, to: UserId) -> bool {
        if from == to {
            debug!(user_id = from, "Self-invite, ignoring");
            return false;
        }

        let delivered = self.presence.send_to(to, &ServerMsg::GameInvite { from });
        if delivered == 0 {
            debug!(from, to, "Invite target offline, dropping");
            return false;
        }

        self.pending.insert((from, to));
        info!(from, to, sessions = delivered, "Game invite sent");
        true
    }

    /// Pair `from` (inviter) and `to` (accepter) into a fresh match.
    ///
    /// Dropped when either side is bound to a match that both of its players
    /// are still connected to, and, with `require_invite`, when the accept was
    /// not sent by `to` or no invite from `from` reached `to`. A binding to a
    /// match with a disconnected player is taken over: that match is
    /// cancelled first.
    pub fn accept(&self, sender: UserId, from: UserId, to: UserId) -> Option<MatchId> {
        if from == to {
            debug!(user_id = from, "Accept of a self-invite, ignoring");
            return None;
        }

        if self.require_invite {
            if sender != to {
                warn!(sender, from, to, "Accept sent on behalf of another identity, ignoring");
                return None;
            }
            if self.pending.remove(&(from, to)).is_none() {
                warn!(sender, from, to, "Accept without a matching invite, ignoring");
                return None;
            }
        } else {
            self.pending.remove(&(from, to));
        }

        let (game_id, cancelled) = {
            let _pairing = self.pairing.lock();

            let mut stale = Vec::new();
            for user_id in [from, to] {
                let Some(bound) = self.presence.match_of(user_id) else {
                    continue;
                };
                if !self.is_abandoned(&bound) {
                    warn!(user_id, game_id = %bound, "Already bound to a match, ignoring accept");
                    return None;
                }
                if !stale.iter().any(|(_, seen)| *seen == bound) {
                    stale.push((user_id, bound));
                }
            }
            let cancelled: Vec<_> = stale
                .into_iter()
                .map(|(user_id, bound)| {
                    let players = self.cancel(user_id, &bound);
                    (bound, players)
                })
                .collect();

            let game_id = self.allocate_id();
            self.battles.insert(Battle::new(game_id.clone(), (from, to)));
            self.presence.bind(from, game_id.clone());
            self.presence.bind(to, game_id.clone());
            (game_id, cancelled)
        };

        for (old_id, players) in cancelled {
            info!(game_id = %old_id, new_game_id = %game_id, "Abandoned match cancelled");
            let notice = ServerMsg::GameCancelled {
                game_id: old_id.clone(),
            };
            for user_id in players {
                self.presence.send_to(user_id, &notice);
                if user_id != from && user_id != to {
                    self.presence.announce_status(user_id);
                }
            }
        }

        self.presence.announce_status(from);
        self.presence.announce_status(to);

        self.presence.send_to(
            from,
            &ServerMsg::GameAccepted {
                from: to,
                game_id: game_id.clone(),
            },
        );
        let start = ServerMsg::GameStart {
            game_id: game_id.clone(),
        };
        for user_id in [from, to] {
            self.presence.send_to(user_id, &start);
        }

        info!(game_id = %game_id, from, to, "Match created");
        Some(game_id)
    }

    /// Whether a match can no longer be played out: its row is gone or one
    /// of its players has no live connection
    fn is_abandoned(&self, game_id: &MatchId) -> bool {
        let Some(handle) = self.battles.get(game_id) else {
            return true;
        };
        let (a, b) = handle.lock().players();
        !(self.presence.is_connected(a) && self.presence.is_connected(b))
    }

    /// Close an abandoned match and release its players, returning them.
    /// Caller holds the pairing lock.
    fn cancel(&self, user_id: UserId, game_id: &MatchId) -> Vec<UserId> {
        let Some(handle) = self.battles.remove(game_id) else {
            self.presence.unbind_from(user_id, game_id);
            return vec![user_id];
        };

        let (a, b) = {
            let mut battle = handle.lock();
            battle.finish();
            battle.players()
        };
        for player in [a, b] {
            self.presence.unbind_from(player, game_id);
        }
        vec![a, b]
    }

    /// Forget any invites involving an identity
    pub fn drop_invites(&self, user_id: UserId) {
        self.pending.retain(|&(from, to)| from != user_id && to != user_id);
    }

    #[cfg(test)]
    pub fn pending_invites(&self) -> usize {
        self.pending.len()
    }

    fn allocate_id(&self) -> MatchId {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        MatchId::from(format!("room-{}", n))
    }
}
