//! WebSocket protocol message definitions
//! These are the wire types for client-server communication.
//!
//! Every frame is `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::game::{Board, MatchId, UserId};
use crate::matchmaking::presence::PresenceStatus;

/// Payload of `accept_game`: `from` invited `to`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptGame {
    pub from: UserId,
    pub to: UserId,
}

/// Payload of `player_ready`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerReady {
    pub game_id: MatchId,
    pub board: Board,
}

/// Payload of `shoot`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shoot {
    pub game_id: MatchId,
    pub x: usize,
    pub y: usize,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Offer a game to another user
    InviteGame(UserId),
    AcceptGame(AcceptGame),
    /// Board submitted, player ready for battle
    PlayerReady(PlayerReady),
    Shoot(Shoot),
    /// Close every session of this identity
    Logout(UserId),
}

/// One entry of the presence list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub id: UserId,
    pub status: PresenceStatus,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Full list of connected identities
    UsersStatus(Vec<UserStatus>),

    /// Single identity changed state
    UserStatusUpdate(UserStatus),

    GameInvite {
        from: UserId,
    },

    /// Sent to the inviter; `from` is the identity that accepted
    GameAccepted {
        from: UserId,
        #[serde(rename = "gameId")]
        game_id: MatchId,
    },

    GameStart {
        #[serde(rename = "gameId")]
        game_id: MatchId,
    },

    BattleStart {
        #[serde(rename = "enemyBoard")]
        enemy_board: Board,
        #[serde(rename = "myTurn")]
        my_turn: bool,
        #[serde(rename = "gameId")]
        game_id: MatchId,
        #[serde(rename = "opponentId")]
        opponent_id: UserId,
    },

    ShotResult {
        x: usize,
        y: usize,
        hit: bool,
        shooter: UserId,
        #[serde(rename = "nextTurn")]
        next_turn: UserId,
    },

    GameFinished {
        #[serde(rename = "winnerId")]
        winner_id: UserId,
    },

    /// Match abandoned before combat started
    GameCancelled {
        #[serde(rename = "gameId")]
        game_id: MatchId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_client_events() {
        let msg: ClientMsg =
            serde_json::from_str(r#"{"event":"invite_game","data":7}"#).unwrap();
        assert!(matches!(msg, ClientMsg::InviteGame(7)));

        let msg: ClientMsg =
            serde_json::from_str(r#"{"event":"accept_game","data":{"from":1,"to":2}}"#).unwrap();
        assert!(matches!(msg, ClientMsg::AcceptGame(AcceptGame { from: 1, to: 2 })));

        let msg: ClientMsg = serde_json::from_str(
            r#"{"event":"shoot","data":{"gameId":"room-3","x":4,"y":5}}"#,
        )
        .unwrap();
        let ClientMsg::Shoot(shot) = msg else {
            panic!("expected shoot");
        };
        assert_eq!(shot.game_id.as_str(), "room-3");
        assert_eq!((shot.x, shot.y), (4, 5));

        let msg: ClientMsg = serde_json::from_str(
            r#"{"event":"player_ready","data":{"gameId":"room-3","board":[[
                {"x":0,"y":0,"hasShip":true,"isHit":false,"blocked":false}
            ]]}}"#,
        )
        .unwrap();
        let ClientMsg::PlayerReady(ready) = msg else {
            panic!("expected player_ready");
        };
        assert!(ready.board.has_survivors());
    }

    #[test]
    fn rejects_negative_coordinates() {
        let parsed = serde_json::from_str::<ClientMsg>(
            r#"{"event":"shoot","data":{"gameId":"room-3","x":-1,"y":0}}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn server_events_use_client_names() {
        let msg = ServerMsg::ShotResult {
            x: 1,
            y: 2,
            hit: true,
            shooter: 5,
            next_turn: 5,
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"event":"shot_result","data":{"x":1,"y":2,"hit":true,"shooter":5,"nextTurn":5}})
        );

        let msg = ServerMsg::UsersStatus(vec![UserStatus {
            id: 3,
            status: PresenceStatus::InGame,
        }]);
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"event":"users_status","data":[{"id":3,"status":"in-game"}]})
        );

        let msg = ServerMsg::GameAccepted {
            from: 2,
            game_id: MatchId::from("room-9"),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({"event":"game_accepted","data":{"from":2,"gameId":"room-9"}})
        );
    }
}
