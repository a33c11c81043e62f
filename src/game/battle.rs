//! Per-match battle state machine and the table of live battles

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::FirstTurn;

use super::board::Board;
use super::{MatchId, UserId};

/// Battle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BattlePhase {
    /// Zero or one board submitted
    AwaitingBoards,
    /// Both boards in, `current_turn` set
    InCombat,
    /// One fleet is fully hit
    Finished,
}

/// Result of a board submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Not a player, or the battle is past the readiness phase
    Ignored,
    /// Stored, still waiting for the other board
    Waiting,
    /// Second board arrived; `first` shoots first
    CombatStarted { first: UserId },
}

/// Result of an accepted shot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotOutcome {
    /// The game goes on
    Resolved { hit: bool, next_turn: UserId },
    /// The shot sank the last afloat cell
    Finished { winner: UserId, loser: UserId },
}

/// Authoritative state of one two-player match
#[derive(Debug)]
pub struct Battle {
    id: MatchId,
    players: (UserId, UserId),
    boards: HashMap<UserId, Board>,
    current_turn: Option<UserId>,
    phase: BattlePhase,
}

impl Battle {
    pub fn new(id: MatchId, players: (UserId, UserId)) -> Self {
        Self {
            id,
            players,
            boards: HashMap::with_capacity(2),
            current_turn: None,
            phase: BattlePhase::AwaitingBoards,
        }
    }

    pub fn id(&self) -> &MatchId {
        &self.id
    }

    pub fn players(&self) -> (UserId, UserId) {
        self.players
    }

    pub fn phase(&self) -> BattlePhase {
        self.phase
    }

    #[cfg(test)]
    pub fn current_turn(&self) -> Option<UserId> {
        self.current_turn
    }

    pub fn is_player(&self, user_id: UserId) -> bool {
        self.players.0 == user_id || self.players.1 == user_id
    }

    pub fn opponent_of(&self, user_id: UserId) -> Option<UserId> {
        match self.players {
            (a, b) if a == user_id => Some(b),
            (a, b) if b == user_id => Some(a),
            _ => None,
        }
    }

    pub fn board_of(&self, user_id: UserId) -> Option<&Board> {
        self.boards.get(&user_id)
    }

    /// Store a player's board. Resubmitting before combat replaces the
    /// earlier layout; once combat starts layouts are frozen.
    pub fn submit_board(&mut self, user_id: UserId, board: Board, first_turn: FirstTurn) -> ReadyOutcome {
        if !self.is_player(user_id) || self.phase != BattlePhase::AwaitingBoards {
            return ReadyOutcome::Ignored;
        }

        self.boards.insert(user_id, board);
        if self.boards.len() < 2 {
            return ReadyOutcome::Waiting;
        }

        let first = match first_turn {
            FirstTurn::Inviter => self.players.0,
            FirstTurn::Random if rand::thread_rng().gen_bool(0.5) => self.players.1,
            FirstTurn::Random => self.players.0,
        };
        self.current_turn = Some(first);
        self.phase = BattlePhase::InCombat;
        ReadyOutcome::CombatStarted { first }
    }

    /// Resolve a shot at the opponent's board.
    ///
    /// Returns `None` for anything that must be absorbed: wrong phase, not
    /// the shooter's turn, off-grid coordinates. A hit keeps the turn, a
    /// miss passes it.
    pub fn shoot(&mut self, user_id: UserId, x: usize, y: usize) -> Option<ShotOutcome> {
        if self.phase != BattlePhase::InCombat || self.current_turn != Some(user_id) {
            debug!(game_id = %self.id, user_id, "Shot out of turn or phase, ignoring");
            return None;
        }

        let opponent = self.opponent_of(user_id)?;
        let board = self.boards.get_mut(&opponent)?;
        let Some(hit) = board.strike(x, y) else {
            debug!(game_id = %self.id, user_id, x, y, "Shot off the grid, ignoring");
            return None;
        };

        if !board.has_survivors() {
            self.phase = BattlePhase::Finished;
            return Some(ShotOutcome::Finished {
                winner: user_id,
                loser: opponent,
            });
        }

        if !hit {
            self.current_turn = Some(opponent);
        }

        Some(ShotOutcome::Resolved {
            hit,
            next_turn: self.current_turn.unwrap_or(opponent),
        })
    }

    /// Move to the terminal phase without a shot (forfeit, cancellation)
    pub fn finish(&mut self) {
        self.phase = BattlePhase::Finished;
    }
}

/// Shared handle to a battle; the mutex serializes mutators per match
pub type BattleHandle = Arc<Mutex<Battle>>;

/// Registry of all live battles
pub struct BattleTable {
    battles: DashMap<MatchId, BattleHandle>,
}

impl BattleTable {
    pub fn new() -> Self {
        Self {
            battles: DashMap::new(),
        }
    }

    pub fn get(&self, id: &MatchId) -> Option<BattleHandle> {
        self.battles.get(id).map(|b| b.value().clone())
    }

    pub fn insert(&self, battle: Battle) -> BattleHandle {
        let id = battle.id().clone();
        let handle = Arc::new(Mutex::new(battle));
        self.battles.insert(id, handle.clone());
        handle
    }

    pub fn remove(&self, id: &MatchId) -> Option<BattleHandle> {
        self.battles.remove(id).map(|(_, b)| b)
    }

    pub fn active_battles(&self) -> usize {
        self.battles.len()
    }
}

impl Default for BattleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::board::{Orientation, Ship};

    const A: UserId = 1;
    const B: UserId = 2;

    fn ship() -> Ship {
        Ship {
            id: "s".to_string(),
            size: 1,
            orientation: Orientation::Vertical,
            placed: Some(true),
        }
    }

    fn battle() -> Battle {
        Battle::new(MatchId::from("room-1"), (A, B))
    }

    /// A has a ship at (0,0), B has ships at (1,1) and (2,2)
    fn in_combat() -> Battle {
        let mut b = battle();
        b.submit_board(A, Board::empty(4).with_ship_at(0, 0, &ship()), FirstTurn::Inviter);
        b.submit_board(
            B,
            Board::empty(4)
                .with_ship_at(1, 1, &ship())
                .with_ship_at(2, 2, &ship()),
            FirstTurn::Inviter,
        );
        b
    }

    #[test]
    fn combat_starts_only_after_both_boards() {
        let mut b = battle();
        assert_eq!(
            b.submit_board(A, Board::empty(3), FirstTurn::Inviter),
            ReadyOutcome::Waiting
        );
        assert_eq!(b.phase(), BattlePhase::AwaitingBoards);
        assert_eq!(b.current_turn(), None);

        assert_eq!(
            b.submit_board(B, Board::empty(3), FirstTurn::Inviter),
            ReadyOutcome::CombatStarted { first: A }
        );
        assert_eq!(b.phase(), BattlePhase::InCombat);
        assert_eq!(b.current_turn(), Some(A));
    }

    #[test]
    fn resubmitting_the_same_board_does_not_start_combat() {
        let mut b = battle();
        b.submit_board(A, Board::empty(3), FirstTurn::Inviter);
        assert_eq!(
            b.submit_board(A, Board::empty(5), FirstTurn::Inviter),
            ReadyOutcome::Waiting
        );
        assert_eq!(b.phase(), BattlePhase::AwaitingBoards);
    }

    #[test]
    fn outsiders_and_late_boards_are_ignored() {
        let mut b = battle();
        assert_eq!(
            b.submit_board(99, Board::empty(3), FirstTurn::Inviter),
            ReadyOutcome::Ignored
        );

        let mut b = in_combat();
        assert_eq!(
            b.submit_board(A, Board::empty(4), FirstTurn::Inviter),
            ReadyOutcome::Ignored
        );
        // A's ship is still there
        assert!(b.board_of(A).unwrap().cell(0, 0).unwrap().has_ship);
    }

    #[test]
    fn random_first_turn_picks_a_player() {
        let mut b = battle();
        b.submit_board(A, Board::empty(2), FirstTurn::Random);
        let outcome = b.submit_board(B, Board::empty(2), FirstTurn::Random);
        let ReadyOutcome::CombatStarted { first } = outcome else {
            panic!("expected combat start, got {outcome:?}");
        };
        assert!(first == A || first == B);
        assert_eq!(b.current_turn(), Some(first));
    }

    #[test]
    fn no_shots_before_combat() {
        let mut b = battle();
        b.submit_board(A, Board::empty(3), FirstTurn::Inviter);
        assert_eq!(b.shoot(A, 0, 0), None);
    }

    #[test]
    fn out_of_turn_shot_is_ignored() {
        let mut b = in_combat();
        assert_eq!(b.shoot(B, 0, 0), None);
        assert_eq!(b.current_turn(), Some(A));
        assert!(!b.board_of(A).unwrap().cell(0, 0).unwrap().is_hit);
    }

    #[test]
    fn miss_passes_turn_and_hit_keeps_it() {
        let mut b = in_combat();

        assert_eq!(
            b.shoot(A, 1, 1),
            Some(ShotOutcome::Resolved { hit: true, next_turn: A })
        );
        assert_eq!(b.current_turn(), Some(A));

        assert_eq!(
            b.shoot(A, 3, 3),
            Some(ShotOutcome::Resolved { hit: false, next_turn: B })
        );
        assert_eq!(b.current_turn(), Some(B));
    }

    #[test]
    fn repeated_hit_reports_hit_again_and_keeps_is_hit() {
        let mut b = in_combat();
        b.shoot(A, 1, 1);
        assert_eq!(
            b.shoot(A, 1, 1),
            Some(ShotOutcome::Resolved { hit: true, next_turn: A })
        );
        assert!(b.board_of(B).unwrap().cell(1, 1).unwrap().is_hit);
    }

    #[test]
    fn off_grid_shot_is_ignored() {
        let mut b = in_combat();
        assert_eq!(b.shoot(A, 4, 0), None);
        assert_eq!(b.current_turn(), Some(A));
    }

    #[test]
    fn sinking_last_cell_finishes_with_shooter_as_winner() {
        let mut b = in_combat();
        b.shoot(A, 1, 1);
        assert_eq!(
            b.shoot(A, 2, 2),
            Some(ShotOutcome::Finished { winner: A, loser: B })
        );
        assert_eq!(b.phase(), BattlePhase::Finished);
        assert_eq!(b.shoot(A, 0, 1), None);
    }

    #[test]
    fn empty_fleet_is_finished_on_first_shot() {
        let mut b = battle();
        b.submit_board(A, Board::empty(2).with_ship_at(1, 0, &ship()), FirstTurn::Inviter);
        b.submit_board(B, Board::empty(2), FirstTurn::Inviter);
        assert_eq!(
            b.shoot(A, 0, 0),
            Some(ShotOutcome::Finished { winner: A, loser: B })
        );
    }

    #[test]
    fn table_tracks_battles() {
        let table = BattleTable::new();
        let handle = table.insert(battle());
        assert_eq!(table.active_battles(), 1);

        let id = MatchId::from("room-1");
        assert!(Arc::ptr_eq(&table.get(&id).unwrap(), &handle));
        assert!(table.remove(&id).is_some());
        assert!(table.get(&id).is_none());
        assert_eq!(table.active_battles(), 0);
    }
}
