//! Race Game
//!
//! Four pieces per player race from home around a shared 52-cell track
//! and up a private 6-cell home stretch. Landing on an opponent on a
//! non-safe cell captures it back to home. A 6 or a capture grants the
//! same player another roll.
//!
//! Piece offsets are player-relative: -1 = home, 0..=51 = shared
//! track, 52..=56 = home stretch, 57 = finished.

use serde::{Deserialize, Serialize};

use crate::game::rng::GameRng;
use crate::game::{GameError, GameStatus, PlayerId, PlayerProfile};

/// Pieces per player.
pub const PIECES_PER_PLAYER: usize = 4;

/// Offset at which a piece has finished.
pub const FINISH: i8 = 57;

/// Length of the shared track; offsets beyond it are the home stretch.
const TRACK_LEN: i16 = 52;

/// Absolute track cells where landing never captures.
pub const SAFE_CELLS: [u8; 8] = [1, 9, 14, 22, 27, 35, 40, 48];

/// Absolute entry cell per seat color, in seat order.
const START_CELLS: [u8; 4] = [1, 14, 27, 40];

/// Seat colors, assigned by join order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// First seat.
    Red,
    /// Second seat.
    Blue,
    /// Third seat.
    Green,
    /// Fourth seat.
    Yellow,
}

impl Color {
    fn from_seat(seat: usize) -> Option<Color> {
        match seat {
            0 => Some(Color::Red),
            1 => Some(Color::Blue),
            2 => Some(Color::Green),
            3 => Some(Color::Yellow),
            _ => None,
        }
    }
}

/// One seated player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LudoPlayer {
    /// Identity and display name.
    pub profile: PlayerProfile,
    /// Seat color.
    pub color: Color,
    /// Relative offsets of the four pieces.
    pub pieces: [i8; PIECES_PER_PLAYER],
}

/// A capture produced by a move.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capture {
    /// Seat index of the captured piece's owner.
    pub player_index: usize,
    /// Which of their pieces was sent home.
    pub piece: usize,
}

/// Result of a successful dice roll.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RollOutcome {
    /// Face value rolled.
    pub value: u8,
    /// True when no piece could move and the turn passed immediately.
    pub auto_passed: bool,
}

/// Result of a successful piece move.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Which piece moved.
    pub piece: usize,
    /// Its new relative offset.
    pub new_pos: i8,
    /// Opponent piece sent home, if any.
    pub captured: Option<Capture>,
    /// Winner, when this move finished the mover's last piece.
    pub winner: Option<PlayerId>,
    /// True when the mover keeps the turn (rolled a 6 or captured).
    pub turn_repeats: bool,
}

/// The race-game state machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LudoGame {
    players: Vec<LudoPlayer>,
    current: usize,
    status: GameStatus,
    pending_roll: Option<u8>,
    rng: GameRng,
}

impl LudoGame {
    /// Create an empty waiting game.
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
            current: 0,
            status: GameStatus::Waiting,
            pending_roll: None,
            rng: GameRng::default(),
        }
    }

    /// Seat a player. Fails once the game has started or the player is
    /// already seated; capacity is checked by the caller.
    pub fn add_player(&mut self, profile: PlayerProfile) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::invalid("game already started"));
        }
        if self.players.iter().any(|p| p.profile.id == profile.id) {
            return Err(GameError::invalid("already seated"));
        }
        let color = Color::from_seat(self.players.len())
            .ok_or_else(|| GameError::invalid("no free seat"))?;
        self.players.push(LudoPlayer {
            profile,
            color,
            pieces: [-1; PIECES_PER_PLAYER],
        });
        Ok(())
    }

    /// Remove a player and repair the turn index.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let Some(idx) = self.players.iter().position(|p| p.profile.id == id) else {
            return false;
        };
        self.players.remove(idx);

        if idx == self.current {
            self.pending_roll = None;
        }
        if idx < self.current {
            self.current -= 1;
        }
        if self.current >= self.players.len() {
            self.current = 0;
        }
        true
    }

    /// Fix turn order and begin play. Requires at least two players.
    pub fn start(&mut self, seed: u64) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::invalid("game already started"));
        }
        if self.players.len() < 2 {
            return Err(GameError::invalid("need at least 2 players"));
        }
        self.rng = GameRng::new(seed);
        self.current = 0;
        self.pending_roll = None;
        self.status = GameStatus::Playing;
        Ok(())
    }

    /// Roll the die for the current turn.
    ///
    /// When no piece can legally move with the rolled value, the roll
    /// is discarded and the turn passes immediately.
    pub fn roll(&mut self, player: PlayerId) -> Result<RollOutcome, GameError> {
        let value = self.rng.roll_die();
        self.roll_with(player, value)
    }

    /// Apply a specific roll value. Split out from [`Self::roll`] so
    /// tests can drive exact dice sequences.
    pub(crate) fn roll_with(&mut self, player: PlayerId, value: u8) -> Result<RollOutcome, GameError> {
        self.check_turn(player)?;
        if self.pending_roll.is_some() {
            return Err(GameError::AlreadyActed);
        }

        let seat = self.current;
        let auto_passed = !self.has_any_move(seat, value);
        if auto_passed {
            self.advance_turn();
        } else {
            self.pending_roll = Some(value);
        }
        Ok(RollOutcome { value, auto_passed })
    }

    /// Move one of the current player's pieces by the pending roll.
    pub fn move_piece(&mut self, player: PlayerId, piece: usize) -> Result<MoveOutcome, GameError> {
        self.check_turn(player)?;
        let roll = self
            .pending_roll
            .ok_or_else(|| GameError::invalid("roll the die first"))?;
        if piece >= PIECES_PER_PLAYER {
            return Err(GameError::invalid("no such piece"));
        }

        let seat = self.current;
        if !self.can_move(seat, piece, roll) {
            return Err(GameError::invalid("piece cannot move"));
        }

        let old_pos = self.players[seat].pieces[piece];
        let new_pos = if old_pos == -1 { 0 } else { old_pos + roll as i8 };
        self.players[seat].pieces[piece] = new_pos;

        let mut winner = None;
        let mut captured = None;

        if new_pos == FINISH {
            if self.players[seat].pieces.iter().all(|&p| p == FINISH) {
                self.status = GameStatus::Finished;
                winner = Some(self.players[seat].profile.id);
            }
        } else if new_pos < TRACK_LEN as i8 {
            captured = self.capture_at(seat, new_pos);
        }

        let turn_repeats = roll == 6 || captured.is_some();
        self.pending_roll = None;
        if self.status == GameStatus::Playing && !turn_repeats {
            self.advance_turn();
        }

        Ok(MoveOutcome {
            piece,
            new_pos,
            captured,
            winner,
            turn_repeats,
        })
    }

    /// Forced turn-clock default: discard any pending roll, pass the turn.
    pub fn apply_timeout_default(&mut self) {
        self.pending_roll = None;
        self.advance_turn();
    }

    /// Whether a specific piece can move with the given roll.
    fn can_move(&self, seat: usize, piece: usize, roll: u8) -> bool {
        let pos = self.players[seat].pieces[piece];
        if pos == -1 {
            return roll == 6;
        }
        pos >= 0 && pos + (roll as i8) <= FINISH
    }

    fn has_any_move(&self, seat: usize, roll: u8) -> bool {
        (0..PIECES_PER_PLAYER).any(|piece| self.can_move(seat, piece, roll))
    }

    /// Capture any opponent piece sharing the mover's new absolute
    /// cell, unless the cell is safe. Stretch pieces cannot be hit.
    fn capture_at(&mut self, seat: usize, new_pos: i8) -> Option<Capture> {
        let abs = Self::absolute_cell(self.players[seat].color, new_pos);
        if SAFE_CELLS.contains(&abs) {
            return None;
        }

        let mover_color = self.players[seat].color;
        for (other_idx, other) in self.players.iter_mut().enumerate() {
            if other.color == mover_color {
                continue;
            }
            for (piece_idx, pos) in other.pieces.iter_mut().enumerate() {
                if *pos >= 0 && (*pos as i16) < TRACK_LEN && Self::absolute_cell(other.color, *pos) == abs {
                    *pos = -1;
                    return Some(Capture {
                        player_index: other_idx,
                        piece: piece_idx,
                    });
                }
            }
        }
        None
    }

    /// Absolute track cell for a relative offset (offset must be 0..=51).
    fn absolute_cell(color: Color, offset: i8) -> u8 {
        let start = START_CELLS[color as usize] as i16;
        (((start + offset as i16 - 1) % TRACK_LEN + TRACK_LEN) % TRACK_LEN) as u8
    }

    fn advance_turn(&mut self) {
        if !self.players.is_empty() {
            self.current = (self.current + 1) % self.players.len();
        }
    }

    fn check_turn(&self, player: PlayerId) -> Result<(), GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::invalid("game is not in progress"));
        }
        let seat = self
            .seat_of(player)
            .ok_or_else(|| GameError::invalid("not seated in this game"))?;
        if seat != self.current {
            return Err(GameError::NotYourTurn);
        }
        Ok(())
    }

    /// Seat index of a player id.
    pub fn seat_of(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.profile.id == id)
    }

    /// Current status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Park a mid-game session for archival. Only a playing game can
    /// be suspended.
    pub fn suspend(&mut self) {
        if self.status == GameStatus::Playing {
            self.status = GameStatus::Saved;
        }
    }

    /// Seated players in turn order.
    pub fn players(&self) -> &[LudoPlayer] {
        &self.players
    }

    /// Index of the player whose turn it is.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Public projection.
    pub fn public_state(&self) -> LudoPublic {
        LudoPublic {
            status: self.status,
            players: self
                .players
                .iter()
                .map(|p| LudoPlayerPublic {
                    id: p.profile.id.to_uuid_string(),
                    display_name: p.profile.display_name.clone(),
                    color: p.color,
                    pieces: p.pieces,
                })
                .collect(),
            current_player_index: self.current,
            pending_roll: self.pending_roll,
            max_players: super::GameKind::Ludo.capacity(),
        }
    }
}

impl Default for LudoGame {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PROJECTIONS
// =============================================================================

/// Public view of one seat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LudoPlayerPublic {
    /// Player id (UUID string).
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Seat color.
    pub color: Color,
    /// Piece offsets.
    pub pieces: [i8; PIECES_PER_PLAYER],
}

/// Public projection of the whole game. Contains no hidden
/// information; the race game has none.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LudoPublic {
    /// Lifecycle status.
    pub status: GameStatus,
    /// Seats in turn order.
    pub players: Vec<LudoPlayerPublic>,
    /// Whose turn it is.
    pub current_player_index: usize,
    /// Rolled-but-not-yet-moved die value.
    pub pending_roll: Option<u8>,
    /// Seat capacity.
    pub max_players: usize,
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(n: u8, name: &str) -> PlayerProfile {
        PlayerProfile {
            id: PlayerId::new([n; 16]),
            display_name: name.into(),
        }
    }

    fn two_player_game() -> LudoGame {
        let mut game = LudoGame::new();
        game.add_player(profile(1, "alice")).unwrap();
        game.add_player(profile(2, "bob")).unwrap();
        game.start(42).unwrap();
        game
    }

    fn p(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    #[test]
    fn test_start_requires_two_players() {
        let mut game = LudoGame::new();
        game.add_player(profile(1, "alice")).unwrap();
        assert!(game.start(1).is_err());
        game.add_player(profile(2, "bob")).unwrap();
        assert!(game.start(1).is_ok());
        assert_eq!(game.status(), GameStatus::Playing);
    }

    #[test]
    fn test_join_after_start_rejected() {
        let mut game = two_player_game();
        let err = game.add_player(profile(3, "carol")).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_roll_out_of_turn_rejected() {
        let mut game = two_player_game();
        assert_eq!(game.roll_with(p(2), 6), Err(GameError::NotYourTurn));
    }

    #[test]
    fn test_double_roll_rejected() {
        let mut game = two_player_game();
        game.roll_with(p(1), 6).unwrap();
        assert_eq!(game.roll_with(p(1), 3), Err(GameError::AlreadyActed));
    }

    #[test]
    fn test_home_piece_needs_six() {
        let mut game = two_player_game();
        // All pieces home, roll of 3 has no legal move: turn auto-passes.
        let outcome = game.roll_with(p(1), 3).unwrap();
        assert!(outcome.auto_passed);
        assert_eq!(game.current_index(), 1);
    }

    #[test]
    fn test_six_enters_piece_and_repeats_turn() {
        let mut game = two_player_game();
        game.roll_with(p(1), 6).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert_eq!(outcome.new_pos, 0);
        assert!(outcome.turn_repeats);
        assert_eq!(game.current_index(), 0);
    }

    #[test]
    fn test_move_without_roll_rejected() {
        let mut game = two_player_game();
        let err = game.move_piece(p(1), 0).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_overshoot_is_illegal() {
        let mut game = two_player_game();
        game.players[0].pieces = [55, 57, 57, 57];
        game.players[1].pieces = [0, -1, -1, -1];
        // 55 + 4 = 59 > 57: no legal move, roll auto-passes.
        let outcome = game.roll_with(p(1), 4).unwrap();
        assert!(outcome.auto_passed);
        game.roll_with(p(2), 3).unwrap();
        game.move_piece(p(2), 0).unwrap();
        // 55 + 2 = 57 is exact and legal.
        game.roll_with(p(1), 2).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert_eq!(outcome.new_pos, FINISH);
        assert_eq!(outcome.winner, Some(p(1)));
        assert_eq!(game.status(), GameStatus::Finished);
    }

    #[test]
    fn test_capture_sends_piece_home_and_repeats_turn() {
        let mut game = two_player_game();
        // Red offset 15 is absolute cell (1 + 15 - 1) % 52 = 15 (not safe).
        // Blue offset 2 is absolute cell (14 + 2 - 1) % 52 = 15.
        game.players[0].pieces = [10, -1, -1, -1];
        game.players[1].pieces = [2, -1, -1, -1];
        game.roll_with(p(1), 5).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert_eq!(
            outcome.captured,
            Some(Capture {
                player_index: 1,
                piece: 0
            })
        );
        assert_eq!(game.players[1].pieces[0], -1);
        assert!(outcome.turn_repeats);
        assert_eq!(game.current_index(), 0);
    }

    #[test]
    fn test_safe_cell_blocks_capture() {
        let mut game = two_player_game();
        // Red offset 9 is absolute cell 9, which is safe.
        game.players[0].pieces = [4, -1, -1, -1];
        game.players[1].pieces = [48, -1, -1, -1]; // blue 48 -> abs (14+48-1)%52 = 9
        game.roll_with(p(1), 5).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert_eq!(outcome.captured, None);
        assert_eq!(game.players[1].pieces[0], 48);
    }

    #[test]
    fn test_stretch_piece_cannot_be_captured() {
        let mut game = two_player_game();
        game.players[0].pieces = [1, -1, -1, -1];
        // Blue piece on its home stretch; shares no absolute cell.
        game.players[1].pieces = [53, -1, -1, -1];
        game.roll_with(p(1), 4).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert_eq!(outcome.captured, None);
    }

    #[test]
    fn test_non_six_passes_turn() {
        let mut game = two_player_game();
        game.players[0].pieces = [0, -1, -1, -1];
        game.roll_with(p(1), 3).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert!(!outcome.turn_repeats);
        assert_eq!(game.current_index(), 1);
    }

    #[test]
    fn test_timeout_default_clears_roll_and_advances() {
        let mut game = two_player_game();
        game.roll_with(p(1), 6).unwrap();
        game.apply_timeout_default();
        assert_eq!(game.current_index(), 1);
        assert_eq!(game.public_state().pending_roll, None);
    }

    #[test]
    fn test_remove_current_player_repairs_index() {
        let mut game = LudoGame::new();
        game.add_player(profile(1, "alice")).unwrap();
        game.add_player(profile(2, "bob")).unwrap();
        game.add_player(profile(3, "carol")).unwrap();
        game.start(1).unwrap();

        assert!(game.remove_player(p(1)));
        assert_eq!(game.current_index(), 0);
        assert_eq!(game.players().len(), 2);
        assert_eq!(game.players()[0].profile.id, p(2));
    }

    #[test]
    fn test_public_state_idempotent() {
        let mut game = two_player_game();
        game.roll_with(p(1), 6).unwrap();
        let a = serde_json::to_string(&game.public_state()).unwrap();
        let b = serde_json::to_string(&game.public_state()).unwrap();
        assert_eq!(a, b);
    }

    /// Scenario: four consecutive sixes enter all four pieces, the
    /// turn staying with the roller until a non-six move passes it.
    #[test]
    fn test_consecutive_sixes_retain_turn() {
        let mut game = two_player_game();

        for piece in 0..4 {
            game.roll_with(p(1), 6).unwrap();
            let outcome = game.move_piece(p(1), piece).unwrap();
            assert!(outcome.turn_repeats);
            assert_eq!(game.current_index(), 0, "turn must stay after a 6");
        }
        assert!(game.players()[0].pieces.iter().all(|&pos| pos >= 0));

        // A non-six, non-capturing move passes the turn.
        game.roll_with(p(1), 2).unwrap();
        let outcome = game.move_piece(p(1), 0).unwrap();
        assert!(!outcome.turn_repeats);
        assert_eq!(game.current_index(), 1);
    }

    /// Offsets stay inside {-1} ∪ [0, 57] across random legal play.
    #[test]
    fn test_offsets_stay_in_range_over_random_play() {
        let mut game = two_player_game();
        let ids = [p(1), p(2)];

        for _ in 0..2000 {
            if game.status() != GameStatus::Playing {
                break;
            }
            let seat = game.current_index();
            let id = ids[seat];
            match game.roll(id) {
                Ok(outcome) if !outcome.auto_passed => {
                    // Try pieces in order until one moves.
                    for piece in 0..PIECES_PER_PLAYER {
                        if game.move_piece(id, piece).is_ok() {
                            break;
                        }
                    }
                }
                _ => {}
            }
            for player in game.players() {
                for &pos in &player.pieces {
                    assert!((-1..=FINISH).contains(&pos), "offset {} out of range", pos);
                }
            }
        }
    }
}
