//! Shedding Card Game
//!
//! A 108-card deck: per color one 0, two each of 1..9, two each of
//! skip / reverse / draw-two, plus four wilds and four wild-draw-fours.
//! Players shed cards onto a discard pile by matching the current
//! color or the top card's value; the first empty hand wins.
//!
//! Hands are hidden information: the public projection carries only
//! hand counts, and each player's own hand is delivered privately.
//!
//! Card-count invariant: draw pile + discard pile + all hands always
//! total 108 while the game is playing.

use serde::{Deserialize, Serialize};

use crate::game::rng::GameRng;
use crate::game::{GameError, GameStatus, PlayerId, PlayerProfile};

/// Total cards in the deck.
pub const DECK_SIZE: usize = 108;

/// Cards dealt to each player at start.
pub const HAND_SIZE: usize = 7;

/// Card colors. `Wild` is the intrinsic color of wild cards only;
/// the active color after a wild is one of the four real colors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardColor {
    /// Red.
    Red,
    /// Blue.
    Blue,
    /// Green.
    Green,
    /// Yellow.
    Yellow,
    /// Wild (colorless until played).
    Wild,
}

const REAL_COLORS: [CardColor; 4] = [
    CardColor::Red,
    CardColor::Blue,
    CardColor::Green,
    CardColor::Yellow,
];

/// Card face values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardValue {
    /// Digit 0..=9.
    Number(u8),
    /// Skip the next player.
    Skip,
    /// Flip play direction.
    Reverse,
    /// Next player draws two and is skipped.
    DrawTwo,
    /// Color change.
    Wild,
    /// Color change; next player draws four and is skipped.
    WildDrawFour,
}

/// One card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Intrinsic color.
    pub color: CardColor,
    /// Face value.
    pub value: CardValue,
}

impl Card {
    /// Whether this is a wild or wild-draw-four.
    pub fn is_wild(&self) -> bool {
        self.color == CardColor::Wild
    }
}

/// One seated player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnoPlayer {
    /// Identity and display name.
    pub profile: PlayerProfile,
    /// Hidden hand.
    pub hand: Vec<Card>,
    /// Declared down to their final card.
    pub called_uno: bool,
}

/// Result of a successful card play.
#[derive(Clone, Debug)]
pub struct PlayOutcome {
    /// The card played.
    pub card: Card,
    /// Active color after the play.
    pub color: CardColor,
    /// Seat forced to draw, with the count.
    pub forced_draw: Option<(usize, usize)>,
    /// Seat skipped over.
    pub skipped: Option<usize>,
    /// Winner, when the player shed their last card.
    pub winner: Option<PlayerId>,
}

/// Result of a successful draw.
#[derive(Clone, Debug)]
pub struct DrawOutcome {
    /// The drawn card; delivered only to the drawer.
    pub card: Card,
    /// Whether the drawn card could be played immediately.
    pub playable: bool,
    /// The turn passed because the card was unplayable.
    pub turn_passed: bool,
}

/// The shedding-card state machine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnoGame {
    players: Vec<UnoPlayer>,
    draw_pile: Vec<Card>,
    discard: Vec<Card>,
    current_color: CardColor,
    /// +1 or -1.
    direction: i8,
    current: usize,
    status: GameStatus,
    rng: GameRng,
}

impl UnoGame {
    /// Create an empty waiting game.
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
            draw_pile: Vec::new(),
            discard: Vec::new(),
            current_color: CardColor::Red,
            direction: 1,
            current: 0,
            status: GameStatus::Waiting,
            rng: GameRng::default(),
        }
    }

    /// Seat a player with an empty hand.
    pub fn add_player(&mut self, profile: PlayerProfile) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::invalid("game already started"));
        }
        if self.players.iter().any(|p| p.profile.id == profile.id) {
            return Err(GameError::invalid("already seated"));
        }
        if self.players.len() >= super::GameKind::Uno.capacity() {
            return Err(GameError::invalid("no free seat"));
        }
        self.players.push(UnoPlayer {
            profile,
            hand: Vec::new(),
            called_uno: false,
        });
        Ok(())
    }

    /// Remove a player, returning their hand to the draw pile.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let Some(idx) = self.players.iter().position(|p| p.profile.id == id) else {
            return false;
        };
        let player = self.players.remove(idx);
        self.draw_pile.extend(player.hand);

        if idx < self.current {
            self.current -= 1;
        }
        if self.current >= self.players.len() {
            self.current = 0;
        }
        true
    }

    /// Shuffle, deal, flip a non-wild starting discard, begin play.
    pub fn start(&mut self, seed: u64) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::invalid("game already started"));
        }
        if self.players.len() < 2 {
            return Err(GameError::invalid("need at least 2 players"));
        }

        self.rng = GameRng::new(seed);
        self.draw_pile = build_deck();
        self.rng.shuffle(&mut self.draw_pile);

        for player in &mut self.players {
            let at = self.draw_pile.len() - HAND_SIZE;
            player.hand = self.draw_pile.split_off(at);
        }

        // The starting discard must not be wild: put a drawn wild back
        // and reshuffle until a colored card comes up.
        let mut start_card = self.draw_pile.pop().ok_or_else(|| {
            GameError::Invariant("draw pile exhausted while dealing".into())
        })?;
        while start_card.is_wild() {
            self.draw_pile.insert(0, start_card);
            self.rng.shuffle(&mut self.draw_pile);
            start_card = self.draw_pile.pop().ok_or_else(|| {
                GameError::Invariant("draw pile exhausted while dealing".into())
            })?;
        }
        self.current_color = start_card.color;
        self.discard = vec![start_card];

        self.direction = 1;
        self.current = 0;
        self.status = GameStatus::Playing;
        Ok(())
    }

    /// Whether a card is legal against the current discard and color.
    pub fn can_play(&self, card: Card) -> bool {
        if card.is_wild() {
            return true;
        }
        if card.color == self.current_color {
            return true;
        }
        match self.discard.last() {
            Some(top) => card.value == top.value,
            None => false,
        }
    }

    /// Play a card from the current player's hand by index. Wilds
    /// require a declared color.
    pub fn play_card(
        &mut self,
        player: PlayerId,
        card_index: usize,
        chosen_color: Option<CardColor>,
    ) -> Result<PlayOutcome, GameError> {
        self.check_turn(player)?;
        let seat = self.current;

        let card = *self.players[seat]
            .hand
            .get(card_index)
            .ok_or_else(|| GameError::invalid("no such card in hand"))?;
        if !self.can_play(card) {
            return Err(GameError::invalid("card does not match color or value"));
        }
        let color = if card.is_wild() {
            match chosen_color {
                Some(c) if c != CardColor::Wild => c,
                _ => return Err(GameError::invalid("wild requires a declared color")),
            }
        } else {
            card.color
        };

        self.players[seat].hand.remove(card_index);
        self.discard.push(card);
        self.current_color = color;

        let mut skip_next = false;
        let mut draw_count = 0usize;
        match card.value {
            CardValue::Reverse => {
                self.direction = -self.direction;
                // With two players a reverse acts as a skip.
                if self.players.len() == 2 {
                    skip_next = true;
                }
            }
            CardValue::Skip => skip_next = true,
            CardValue::DrawTwo => {
                skip_next = true;
                draw_count = 2;
            }
            CardValue::WildDrawFour => {
                skip_next = true;
                draw_count = 4;
            }
            _ => {}
        }

        let mut next = self.neighbor(seat);
        let mut forced_draw = None;
        if draw_count > 0 {
            let drawn = self.force_draw(next, draw_count);
            forced_draw = Some((next, drawn));
        }
        let mut skipped = None;
        if skip_next {
            skipped = Some(next);
            next = self.neighbor(next);
        }
        self.current = next;

        let winner = if self.players[seat].hand.is_empty() {
            self.status = GameStatus::Finished;
            Some(self.players[seat].profile.id)
        } else {
            None
        };

        Ok(PlayOutcome {
            card,
            color,
            forced_draw,
            skipped,
            winner,
        })
    }

    /// Draw one card. If it cannot be played, the turn passes.
    pub fn draw_card(&mut self, player: PlayerId) -> Result<DrawOutcome, GameError> {
        self.check_turn(player)?;
        let seat = self.current;

        self.ensure_draw_pile();
        let card = self
            .draw_pile
            .pop()
            .ok_or_else(|| GameError::invalid("no cards left to draw"))?;
        self.players[seat].hand.push(card);

        let playable = self.can_play(card);
        if !playable {
            self.current = self.neighbor(seat);
        }

        Ok(DrawOutcome {
            card,
            playable,
            turn_passed: !playable,
        })
    }

    /// Declare being down to a final card. Legal only with exactly one
    /// card in hand; no turn requirement.
    pub fn call_uno(&mut self, player: PlayerId) -> Result<(), GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::invalid("game is not in progress"));
        }
        let seat = self
            .seat_of(player)
            .ok_or_else(|| GameError::invalid("not seated in this game"))?;
        if self.players[seat].hand.len() != 1 {
            return Err(GameError::invalid("can only be called with one card left"));
        }
        self.players[seat].called_uno = true;
        Ok(())
    }

    /// Forced turn-clock default: the current player draws one card
    /// (when any is available) and the turn passes.
    pub fn apply_timeout_default(&mut self) {
        let seat = self.current;
        self.ensure_draw_pile();
        if let Some(card) = self.draw_pile.pop() {
            self.players[seat].hand.push(card);
        }
        self.current = self.neighbor(seat);
    }

    /// Refill the draw pile from the discard pile, keeping the top
    /// discard in place.
    fn ensure_draw_pile(&mut self) {
        if !self.draw_pile.is_empty() || self.discard.len() <= 1 {
            return;
        }
        let top = self.discard.pop().unwrap_or_else(|| unreachable!());
        self.draw_pile.append(&mut self.discard);
        self.rng.shuffle(&mut self.draw_pile);
        self.discard.push(top);
    }

    /// Force a seat to draw up to `count` cards, reshuffling as
    /// needed. Returns how many were actually drawn.
    fn force_draw(&mut self, seat: usize, count: usize) -> usize {
        let mut drawn = 0;
        for _ in 0..count {
            self.ensure_draw_pile();
            match self.draw_pile.pop() {
                Some(card) => {
                    self.players[seat].hand.push(card);
                    drawn += 1;
                }
                None => break,
            }
        }
        drawn
    }

    /// The seat after `seat` in the current direction.
    fn neighbor(&self, seat: usize) -> usize {
        let n = self.players.len() as i64;
        ((seat as i64 + self.direction as i64).rem_euclid(n)) as usize
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
    pub fn players(&self) -> &[UnoPlayer] {
        &self.players
    }

    /// Index of the player whose turn it is.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// A player's hand, for private delivery.
    pub fn hand_of(&self, id: PlayerId) -> Option<&[Card]> {
        self.players
            .iter()
            .find(|p| p.profile.id == id)
            .map(|p| p.hand.as_slice())
    }

    /// Cards across draw pile, discard pile, and all hands.
    pub fn total_cards(&self) -> usize {
        self.draw_pile.len()
            + self.discard.len()
            + self.players.iter().map(|p| p.hand.len()).sum::<usize>()
    }

    /// Public projection: hand counts only, no card contents except
    /// the top discard.
    pub fn public_state(&self) -> UnoPublic {
        UnoPublic {
            status: self.status,
            players: self
                .players
                .iter()
                .map(|p| UnoPlayerPublic {
                    id: p.profile.id.to_uuid_string(),
                    display_name: p.profile.display_name.clone(),
                    hand_count: p.hand.len(),
                    called_uno: p.called_uno,
                })
                .collect(),
            current_player_index: self.current,
            direction: self.direction,
            top_card: self.discard.last().copied(),
            current_color: self.current_color,
            draw_count: self.draw_pile.len(),
            max_players: super::GameKind::Uno.capacity(),
        }
    }
}

impl Default for UnoGame {
    fn default() -> Self {
        Self::new()
    }
}

/// The full 108-card deck, unshuffled.
fn build_deck() -> Vec<Card> {
    let mut deck = Vec::with_capacity(DECK_SIZE);
    for color in REAL_COLORS {
        deck.push(Card {
            color,
            value: CardValue::Number(0),
        });
        for n in 1..=9 {
            for _ in 0..2 {
                deck.push(Card {
                    color,
                    value: CardValue::Number(n),
                });
            }
        }
        for value in [CardValue::Skip, CardValue::Reverse, CardValue::DrawTwo] {
            for _ in 0..2 {
                deck.push(Card { color, value });
            }
        }
    }
    for _ in 0..4 {
        deck.push(Card {
            color: CardColor::Wild,
            value: CardValue::Wild,
        });
        deck.push(Card {
            color: CardColor::Wild,
            value: CardValue::WildDrawFour,
        });
    }
    deck
}

// =============================================================================
// PROJECTIONS
// =============================================================================

/// Public view of one seat: hand size, never hand contents.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnoPlayerPublic {
    /// Player id (UUID string).
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Cards in hand.
    pub hand_count: usize,
    /// Declared down to their final card.
    pub called_uno: bool,
}

/// Public projection of the whole game.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnoPublic {
    /// Lifecycle status.
    pub status: GameStatus,
    /// Seats in turn order.
    pub players: Vec<UnoPlayerPublic>,
    /// Whose turn it is.
    pub current_player_index: usize,
    /// +1 or -1.
    pub direction: i8,
    /// Top of the discard pile.
    pub top_card: Option<Card>,
    /// Active color (differs from the top card's for wilds).
    pub current_color: CardColor,
    /// Cards left in the draw pile.
    pub draw_count: usize,
    /// Seat capacity.
    pub max_players: usize,
}

// =============================================================================
// TESTS
// =============================================================================
