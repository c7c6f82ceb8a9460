//! Property-Trading Game
//!
//! A fixed 40-space board. Players roll two dice, advance modulo 40,
//! and resolve the space they land on: buy, pay rent, pay tax, draw a
//! card, or go to jail. Doubles grant another roll. A player whose
//! balance goes negative is bankrupt; the last solvent player wins.
//!
//! Board layout and rent tables are static; the only mutable per-space
//! state is ownership and building count.

use serde::{Deserialize, Serialize};

use crate::game::rng::GameRng;
use crate::game::{GameError, GameStatus, PlayerId, PlayerProfile};

/// Number of board spaces.
pub const BOARD_SIZE: usize = 40;

/// Credit for passing GO.
pub const GO_BONUS: i64 = 200;

/// Starting balance.
pub const STARTING_MONEY: i64 = 1500;

/// Board index of the jail space.
pub const JAIL_POSITION: usize = 10;

/// Buildings per space: 0..4 houses, 5 = hotel.
pub const MAX_BUILDINGS: u8 = 5;

/// Player tokens, assigned by join order.
const TOKENS: [&str; 6] = ["car", "hat", "dog", "ship", "boot", "thimble"];

// =============================================================================
// BOARD
// =============================================================================

/// What a board space is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpaceKind {
    /// Start space; passing it pays [`GO_BONUS`].
    Go,
    /// Buildable street.
    Property,
    /// Community chest card space.
    Chest,
    /// Chance card space.
    Chance,
    /// Fixed charge.
    Tax,
    /// Railroad; rent scales with railroads owned.
    Railroad,
    /// Utility; rent scales with the dice sum.
    Utility,
    /// Just visiting.
    Jail,
    /// Free parking; no effect.
    Parking,
    /// Sends the mover to jail.
    GoToJail,
}

impl SpaceKind {
    /// Whether this space can be owned.
    pub fn is_ownable(self) -> bool {
        matches!(
            self,
            SpaceKind::Property | SpaceKind::Railroad | SpaceKind::Utility
        )
    }
}

/// One immutable board space. `price` doubles as the charge amount for
/// tax spaces; `rent` is indexed by building count for streets.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct Space {
    /// Display name.
    pub name: &'static str,
    /// Space kind.
    pub kind: SpaceKind,
    /// Color group for streets.
    pub color: Option<&'static str>,
    /// Purchase price (or tax amount).
    pub price: u32,
    /// Rent by building count (streets only).
    pub rent: [u32; 6],
}

const fn street(
    name: &'static str,
    color: &'static str,
    price: u32,
    rent: [u32; 6],
) -> Space {
    Space {
        name,
        kind: SpaceKind::Property,
        color: Some(color),
        price,
        rent,
    }
}

const fn special(name: &'static str, kind: SpaceKind, price: u32) -> Space {
    Space {
        name,
        kind,
        color: None,
        price,
        rent: [0; 6],
    }
}

/// The board, in play order from GO.
pub const BOARD: [Space; BOARD_SIZE] = [
    special("GO", SpaceKind::Go, 0),
    street("Mediterranean Ave", "brown", 60, [2, 10, 30, 90, 160, 250]),
    special("Community Chest", SpaceKind::Chest, 0),
    street("Baltic Ave", "brown", 60, [4, 20, 60, 180, 320, 450]),
    special("Income Tax", SpaceKind::Tax, 200),
    special("Reading Railroad", SpaceKind::Railroad, 200),
    street("Oriental Ave", "lightblue", 100, [6, 30, 90, 270, 400, 550]),
    special("Chance", SpaceKind::Chance, 0),
    street("Vermont Ave", "lightblue", 100, [6, 30, 90, 270, 400, 550]),
    street("Connecticut Ave", "lightblue", 120, [8, 40, 100, 300, 450, 600]),
    special("Jail", SpaceKind::Jail, 0),
    street("St. Charles Place", "pink", 140, [10, 50, 150, 450, 625, 750]),
    special("Electric Company", SpaceKind::Utility, 150),
    street("States Ave", "pink", 140, [10, 50, 150, 450, 625, 750]),
    street("Virginia Ave", "pink", 160, [12, 60, 180, 500, 700, 900]),
    special("Pennsylvania Railroad", SpaceKind::Railroad, 200),
    street("St. James Place", "orange", 180, [14, 70, 200, 550, 750, 950]),
    special("Community Chest", SpaceKind::Chest, 0),
    street("Tennessee Ave", "orange", 180, [14, 70, 200, 550, 750, 950]),
    street("New York Ave", "orange", 200, [16, 80, 220, 600, 800, 1000]),
    special("Free Parking", SpaceKind::Parking, 0),
    street("Kentucky Ave", "red", 220, [18, 90, 250, 700, 875, 1050]),
    special("Chance", SpaceKind::Chance, 0),
    street("Indiana Ave", "red", 220, [18, 90, 250, 700, 875, 1050]),
    street("Illinois Ave", "red", 240, [20, 100, 300, 750, 925, 1100]),
    special("B&O Railroad", SpaceKind::Railroad, 200),
    street("Atlantic Ave", "yellow", 260, [22, 110, 330, 800, 975, 1150]),
    street("Ventnor Ave", "yellow", 260, [22, 110, 330, 800, 975, 1150]),
    special("Water Works", SpaceKind::Utility, 150),
    street("Marvin Gardens", "yellow", 280, [24, 120, 360, 850, 1025, 1200]),
    special("Go To Jail", SpaceKind::GoToJail, 0),
    street("Pacific Ave", "green", 300, [26, 130, 390, 900, 1100, 1275]),
    street("North Carolina Ave", "green", 300, [26, 130, 390, 900, 1100, 1275]),
    special("Community Chest", SpaceKind::Chest, 0),
    street("Pennsylvania Ave", "green", 320, [28, 150, 450, 1000, 1200, 1400]),
    special("Short Line", SpaceKind::Railroad, 200),
    special("Chance", SpaceKind::Chance, 0),
    street("Park Place", "darkblue", 350, [35, 175, 500, 1100, 1300, 1500]),
    special("Luxury Tax", SpaceKind::Tax, 100),
    street("Boardwalk", "darkblue", 400, [50, 200, 600, 1400, 1700, 2000]),
];

/// Building cost by board side: first ten spaces 50, then 100, 150, 200.
pub fn building_cost(space: usize) -> i64 {
    match space / 10 {
        0 => 50,
        1 => 100,
        2 => 150,
        _ => 200,
    }
}

// =============================================================================
// CARD DECKS
// =============================================================================

/// Which deck a drawn card came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckKind {
    /// Chance deck.
    Chance,
    /// Community chest deck.
    Chest,
}

/// A money-delta card.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct DeckCard {
    /// Card text.
    pub text: &'static str,
    /// Signed balance change for the drawer.
    pub amount: i64,
}

const CHANCE_CARDS: [DeckCard; 8] = [
    DeckCard { text: "Bank pays you dividend of $50", amount: 50 },
    DeckCard { text: "Speeding fine, pay $15", amount: -15 },
    DeckCard { text: "Your building loan matures, collect $150", amount: 150 },
    DeckCard { text: "Pay school fees of $50", amount: -50 },
    DeckCard { text: "You have won a crossword competition, collect $100", amount: 100 },
    DeckCard { text: "General repairs, pay $75", amount: -75 },
    DeckCard { text: "Bank error in your favor, collect $200", amount: 200 },
    DeckCard { text: "Doctor's fee, pay $50", amount: -50 },
];

const CHEST_CARDS: [DeckCard; 8] = [
    DeckCard { text: "Life insurance matures, collect $100", amount: 100 },
    DeckCard { text: "Pay hospital fees of $100", amount: -100 },
    DeckCard { text: "Income tax refund, collect $20", amount: 20 },
    DeckCard { text: "Pay your insurance premium of $50", amount: -50 },
    DeckCard { text: "You inherit $100", amount: 100 },
    DeckCard { text: "Street repairs, pay $40", amount: -40 },
    DeckCard { text: "From sale of stock you get $45", amount: 45 },
    DeckCard { text: "Holiday fund matures, collect $100", amount: 100 },
];

// =============================================================================
// GAME STATE
// =============================================================================

/// One seated player.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonopolyPlayer {
    /// Identity and display name.
    pub profile: PlayerProfile,
    /// Board token.
    pub token: String,
    /// Board position, 0..=39.
    pub position: usize,
    /// Balance; may be transiently negative before bankruptcy resolves.
    pub money: i64,
    /// Indices of owned spaces.
    pub properties: Vec<usize>,
    /// Set by the go-to-jail space; informational.
    pub in_jail: bool,
    /// Out of the game.
    pub bankrupt: bool,
}

/// What happened on the landed space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Landing {
    /// Nothing to resolve.
    None,
    /// Unowned ownable space; mover may buy.
    CanBuy {
        /// Board index.
        space: usize,
    },
    /// Rent charged and transferred.
    PaidRent {
        /// Board index.
        space: usize,
        /// Amount transferred.
        rent: i64,
        /// Receiving owner.
        owner: PlayerId,
    },
    /// Tax charged.
    PaidTax {
        /// Amount charged.
        amount: i64,
    },
    /// Mover repositioned to jail.
    WentToJail,
    /// Card drawn and its delta applied.
    DrewCard {
        /// Source deck.
        deck: DeckKind,
        /// Card text.
        text: &'static str,
        /// Signed delta applied to the mover.
        amount: i64,
    },
}

/// Result of a successful roll-and-move.
#[derive(Clone, Debug)]
pub struct RollOutcome {
    /// The two dice.
    pub dice: (u8, u8),
    /// Position after moving.
    pub new_position: usize,
    /// GO bonus was credited.
    pub passed_go: bool,
    /// Resolution of the landed space.
    pub landing: Landing,
    /// The mover went bankrupt this roll.
    pub bankrupted: bool,
    /// Winner, when bankruptcy left one solvent player.
    pub winner: Option<PlayerId>,
    /// The mover rolled doubles and keeps the turn.
    pub turn_repeats: bool,
}

/// The property-trading state machine.
#[derive(Clone, Debug)]
pub struct MonopolyGame {
    players: Vec<MonopolyPlayer>,
    /// Owner per board space.
    owners: [Option<PlayerId>; BOARD_SIZE],
    /// Building count per board space.
    houses: [u8; BOARD_SIZE],
    current: usize,
    status: GameStatus,
    rng: GameRng,
}

impl MonopolyGame {
    /// Create an empty waiting game.
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
            owners: [None; BOARD_SIZE],
            houses: [0; BOARD_SIZE],
            current: 0,
            status: GameStatus::Waiting,
            rng: GameRng::default(),
        }
    }

    /// Seat a player at GO with the starting balance.
    pub fn add_player(&mut self, profile: PlayerProfile) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::invalid("game already started"));
        }
        if self.players.iter().any(|p| p.profile.id == profile.id) {
            return Err(GameError::invalid("already seated"));
        }
        let token = TOKENS
            .get(self.players.len())
            .ok_or_else(|| GameError::invalid("no free seat"))?;
        self.players.push(MonopolyPlayer {
            profile,
            token: token.to_string(),
            position: 0,
            money: STARTING_MONEY,
            properties: Vec::new(),
            in_jail: false,
            bankrupt: false,
        });
        Ok(())
    }

    /// Remove a player, releasing everything they own.
    pub fn remove_player(&mut self, id: PlayerId) -> bool {
        let Some(idx) = self.players.iter().position(|p| p.profile.id == id) else {
            return false;
        };
        self.release_holdings(id);
        self.players.remove(idx);

        if idx < self.current {
            self.current -= 1;
        }
        if self.current >= self.players.len() {
            self.current = 0;
        }
        true
    }

    /// Fix turn order and begin play.
    pub fn start(&mut self, seed: u64) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::invalid("game already started"));
        }
        if self.players.len() < 2 {
            return Err(GameError::invalid("need at least 2 players"));
        }
        self.rng = GameRng::new(seed);
        self.current = 0;
        self.status = GameStatus::Playing;
        Ok(())
    }

    /// Roll two dice, move, and resolve the landed space in one step.
    pub fn roll_and_move(&mut self, player: PlayerId) -> Result<RollOutcome, GameError> {
        let dice = self.rng.roll_dice_pair();
        self.roll_and_move_with(player, dice)
    }

    /// Apply a specific dice pair. Split out so tests can drive exact
    /// sequences.
    pub(crate) fn roll_and_move_with(
        &mut self,
        player: PlayerId,
        dice: (u8, u8),
    ) -> Result<RollOutcome, GameError> {
        self.check_turn(player)?;

        let seat = self.current;
        let sum = (dice.0 + dice.1) as usize;
        let old_position = self.players[seat].position;
        let new_position = (old_position + sum) % BOARD_SIZE;
        self.players[seat].position = new_position;

        let passed_go = new_position < old_position;
        if passed_go {
            self.players[seat].money += GO_BONUS;
        }

        let landing = self.resolve_landing(seat, sum);

        let mut bankrupted = false;
        let mut winner = None;
        if self.players[seat].money < 0 {
            bankrupted = true;
            winner = self.declare_bankrupt(seat);
        }

        let turn_repeats = dice.0 == dice.1 && !bankrupted && self.status == GameStatus::Playing;
        if !turn_repeats && self.status == GameStatus::Playing {
            self.advance_turn();
        }

        Ok(RollOutcome {
            dice,
            new_position,
            passed_go,
            landing,
            bankrupted,
            winner,
            turn_repeats,
        })
    }

    /// Buy the unowned space the player is standing on.
    pub fn buy(&mut self, player: PlayerId, space: usize) -> Result<(), GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::invalid("game is not in progress"));
        }
        let seat = self
            .seat_of(player)
            .ok_or_else(|| GameError::invalid("not seated in this game"))?;
        let board_space = BOARD
            .get(space)
            .ok_or_else(|| GameError::Invariant(format!("no such space: {}", space)))?;

        if !board_space.kind.is_ownable() {
            return Err(GameError::invalid("space cannot be bought"));
        }
        if self.owners[space].is_some() {
            return Err(GameError::invalid("space already owned"));
        }
        if self.players[seat].position != space {
            return Err(GameError::invalid("not standing on that space"));
        }
        if self.players[seat].money < board_space.price as i64 {
            return Err(GameError::invalid("insufficient funds"));
        }

        self.players[seat].money -= board_space.price as i64;
        self.owners[space] = Some(player);
        self.players[seat].properties.push(space);
        Ok(())
    }

    /// Add one building to an owned street.
    pub fn buy_building(&mut self, player: PlayerId, space: usize) -> Result<u8, GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::invalid("game is not in progress"));
        }
        let seat = self
            .seat_of(player)
            .ok_or_else(|| GameError::invalid("not seated in this game"))?;
        let board_space = BOARD
            .get(space)
            .ok_or_else(|| GameError::Invariant(format!("no such space: {}", space)))?;

        if board_space.kind != SpaceKind::Property {
            return Err(GameError::invalid("only streets can be built on"));
        }
        if self.owners[space] != Some(player) {
            return Err(GameError::invalid("you do not own that space"));
        }
        if self.houses[space] >= MAX_BUILDINGS {
            return Err(GameError::invalid("space is fully built"));
        }
        let cost = building_cost(space);
        if self.players[seat].money < cost {
            return Err(GameError::invalid("insufficient funds"));
        }

        self.players[seat].money -= cost;
        self.houses[space] += 1;
        Ok(self.houses[space])
    }

    /// Forced turn-clock default: pass the turn.
    pub fn apply_timeout_default(&mut self) {
        self.advance_turn();
    }

    fn resolve_landing(&mut self, seat: usize, dice_sum: usize) -> Landing {
        let position = self.players[seat].position;
        let space = &BOARD[position];

        match space.kind {
            SpaceKind::Property | SpaceKind::Railroad | SpaceKind::Utility => {
                match self.owners[position] {
                    None => Landing::CanBuy { space: position },
                    Some(owner) if owner == self.players[seat].profile.id => Landing::None,
                    Some(owner) => {
                        let rent = self.rent_for(position, owner, dice_sum);
                        self.players[seat].money -= rent;
                        if let Some(owner_seat) =
                            self.players.iter().position(|p| p.profile.id == owner)
                        {
                            self.players[owner_seat].money += rent;
                        }
                        Landing::PaidRent {
                            space: position,
                            rent,
                            owner,
                        }
                    }
                }
            }
            SpaceKind::Tax => {
                let amount = space.price as i64;
                self.players[seat].money -= amount;
                Landing::PaidTax { amount }
            }
            SpaceKind::GoToJail => {
                self.players[seat].position = JAIL_POSITION;
                self.players[seat].in_jail = true;
                Landing::WentToJail
            }
            SpaceKind::Chance => self.draw_card(seat, DeckKind::Chance),
            SpaceKind::Chest => self.draw_card(seat, DeckKind::Chest),
            SpaceKind::Go | SpaceKind::Jail | SpaceKind::Parking => Landing::None,
        }
    }

    fn draw_card(&mut self, seat: usize, deck: DeckKind) -> Landing {
        let cards: &[DeckCard] = match deck {
            DeckKind::Chance => &CHANCE_CARDS,
            DeckKind::Chest => &CHEST_CARDS,
        };
        let card = cards[self.rng.next_int(cards.len() as u32) as usize];
        self.players[seat].money += card.amount;
        Landing::DrewCard {
            deck,
            text: card.text,
            amount: card.amount,
        }
    }

    /// Rent for landing on an owned space.
    fn rent_for(&self, space: usize, owner: PlayerId, dice_sum: usize) -> i64 {
        match BOARD[space].kind {
            SpaceKind::Railroad => {
                let owned = self.count_owned(owner, SpaceKind::Railroad);
                25 * (1i64 << (owned.saturating_sub(1)))
            }
            SpaceKind::Utility => {
                let owned = self.count_owned(owner, SpaceKind::Utility);
                let multiplier = if owned == 1 { 4 } else { 10 };
                (dice_sum as i64) * multiplier
            }
            _ => BOARD[space].rent[self.houses[space] as usize] as i64,
        }
    }

    fn count_owned(&self, owner: PlayerId, kind: SpaceKind) -> u32 {
        (0..BOARD_SIZE)
            .filter(|&i| BOARD[i].kind == kind && self.owners[i] == Some(owner))
            .count() as u32
    }

    /// Mark a seat bankrupt and release its holdings. Returns the
    /// winner when exactly one solvent player remains.
    fn declare_bankrupt(&mut self, seat: usize) -> Option<PlayerId> {
        let id = self.players[seat].profile.id;
        self.release_holdings(id);
        self.players[seat].bankrupt = true;

        let mut solvent = self.players.iter().filter(|p| !p.bankrupt);
        match (solvent.next(), solvent.next()) {
            (Some(last), None) => {
                self.status = GameStatus::Finished;
                Some(last.profile.id)
            }
            _ => None,
        }
    }

    fn release_holdings(&mut self, id: PlayerId) {
        for space in 0..BOARD_SIZE {
            if self.owners[space] == Some(id) {
                self.owners[space] = None;
                self.houses[space] = 0;
            }
        }
        if let Some(player) = self.players.iter_mut().find(|p| p.profile.id == id) {
            player.properties.clear();
        }
    }

    /// Pass the turn, skipping bankrupt seats.
    fn advance_turn(&mut self) {
        let n = self.players.len();
        if n == 0 {
            return;
        }
        for _ in 0..n {
            self.current = (self.current + 1) % n;
            if !self.players[self.current].bankrupt {
                return;
            }
        }
    }

    fn check_turn(&self, player: PlayerId) -> Result<(), GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::invalid("game is not in progress"));
        }
        let seat = self
            .seat_of(player)
            .ok_or_else(|| GameError::invalid("not seated in this game"))?;
        if self.players[seat].bankrupt {
            return Err(GameError::invalid("you are bankrupt"));
        }
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
    pub fn players(&self) -> &[MonopolyPlayer] {
        &self.players
    }

    /// Index of the player whose turn it is.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Owner of a board space.
    pub fn owner_of(&self, space: usize) -> Option<PlayerId> {
        self.owners.get(space).copied().flatten()
    }

    /// Building count on a board space.
    pub fn houses_on(&self, space: usize) -> u8 {
        self.houses.get(space).copied().unwrap_or(0)
    }

    /// Public projection.
    pub fn public_state(&self) -> MonopolyPublic {
        MonopolyPublic {
            status: self.status,
            players: self
                .players
                .iter()
                .map(|p| MonopolyPlayerPublic {
                    id: p.profile.id.to_uuid_string(),
                    display_name: p.profile.display_name.clone(),
                    token: p.token.clone(),
                    position: p.position,
                    money: p.money,
                    properties: p.properties.clone(),
                    in_jail: p.in_jail,
                    bankrupt: p.bankrupt,
                })
                .collect(),
            spaces: (0..BOARD_SIZE)
                .map(|i| SpacePublic {
                    name: BOARD[i].name.to_string(),
                    kind: BOARD[i].kind,
                    color: BOARD[i].color.map(str::to_string),
                    price: BOARD[i].price,
                    rent: BOARD[i].rent,
                    owner: self.owners[i].map(|o| o.to_uuid_string()),
                    houses: self.houses[i],
                })
                .collect(),
            current_player_index: self.current,
            max_players: super::GameKind::Monopoly.capacity(),
        }
    }
}

impl Default for MonopolyGame {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PROJECTIONS
// =============================================================================

/// Public view of one seat.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonopolyPlayerPublic {
    /// Player id (UUID string).
    pub id: String,
    /// Display name.
    pub display_name: String,
    /// Board token.
    pub token: String,
    /// Board position.
    pub position: usize,
    /// Balance.
    pub money: i64,
    /// Owned space indices.
    pub properties: Vec<usize>,
    /// Jail flag.
    pub in_jail: bool,
    /// Out of the game.
    pub bankrupt: bool,
}

/// Public view of one board space with its mutable state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpacePublic {
    /// Display name.
    pub name: String,
    /// Space kind.
    pub kind: SpaceKind,
    /// Color group.
    pub color: Option<String>,
    /// Purchase price or tax amount.
    pub price: u32,
    /// Rent table.
    pub rent: [u32; 6],
    /// Owner id (UUID string), if owned.
    pub owner: Option<String>,
    /// Building count.
    pub houses: u8,
}

/// Public projection of the whole game. The trading game has no hidden
/// information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonopolyPublic {
    /// Lifecycle status.
    pub status: GameStatus,
    /// Seats in turn order.
    pub players: Vec<MonopolyPlayerPublic>,
    /// Board with ownership state.
    pub spaces: Vec<SpacePublic>,
    /// Whose turn it is.
    pub current_player_index: usize,
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

    fn p(n: u8) -> PlayerId {
        PlayerId::new([n; 16])
    }

    fn two_player_game() -> MonopolyGame {
        let mut game = MonopolyGame::new();
        game.add_player(profile(1, "alice")).unwrap();
        game.add_player(profile(2, "bob")).unwrap();
        game.start(42).unwrap();
        game
    }

    fn total_money(game: &MonopolyGame) -> i64 {
        game.players().iter().map(|p| p.money).sum()
    }

    #[test]
    fn test_board_shape() {
        assert_eq!(BOARD.len(), 40);
        assert_eq!(BOARD[0].kind, SpaceKind::Go);
        assert_eq!(BOARD[JAIL_POSITION].kind, SpaceKind::Jail);
        assert_eq!(BOARD[30].kind, SpaceKind::GoToJail);
        assert_eq!(BOARD[39].name, "Boardwalk");
        assert_eq!(
            BOARD.iter().filter(|s| s.kind == SpaceKind::Railroad).count(),
            4
        );
        assert_eq!(
            BOARD.iter().filter(|s| s.kind == SpaceKind::Utility).count(),
            2
        );
    }

    /// Scenario: buy an unowned space, then charge its rent to the
    /// other player, zero-sum between the two.
    #[test]
    fn test_buy_then_rent_transfer() {
        let mut game = two_player_game();

        // Alice rolls 1+2 from GO, landing on Baltic Ave.
        let outcome = game.roll_and_move_with(p(1), (1, 2)).unwrap();
        assert_eq!(outcome.new_position, 3); // Baltic Ave, price 60
        assert_eq!(outcome.landing, Landing::CanBuy { space: 3 });

        game.buy(p(1), 3).unwrap();
        assert_eq!(game.players()[0].money, STARTING_MONEY - 60);
        assert_eq!(game.owner_of(3), Some(p(1)));

        // Bob lands on the same space and pays the houses=0 rent of 4.
        let before = (game.players()[0].money, game.players()[1].money);
        let outcome = game.roll_and_move_with(p(2), (1, 2)).unwrap();
        assert_eq!(
            outcome.landing,
            Landing::PaidRent {
                space: 3,
                rent: 4,
                owner: p(1)
            }
        );
        assert_eq!(game.players()[0].money, before.0 + 4);
        assert_eq!(game.players()[1].money, before.1 - 4);
    }

    #[test]
    fn test_buy_requires_standing_on_space() {
        let mut game = two_player_game();
        let err = game.buy(p(1), 3).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_buy_owned_space_rejected() {
        let mut game = two_player_game();
        game.players[0].position = 3;
        game.owners[3] = Some(p(2));
        let err = game.buy(p(1), 3).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_roll_out_of_turn_rejected() {
        let mut game = two_player_game();
        assert_eq!(
            game.roll_and_move_with(p(2), (2, 3)).unwrap_err(),
            GameError::NotYourTurn
        );
    }

    #[test]
    fn test_doubles_repeat_turn() {
        let mut game = two_player_game();
        let outcome = game.roll_and_move_with(p(1), (2, 2)).unwrap();
        assert!(outcome.turn_repeats);
        assert_eq!(game.current_index(), 0);

        let outcome = game.roll_and_move_with(p(1), (2, 3)).unwrap();
        assert!(!outcome.turn_repeats);
        assert_eq!(game.current_index(), 1);
    }

    #[test]
    fn test_passing_go_pays_bonus() {
        let mut game = two_player_game();
        game.players[0].position = 38;
        let outcome = game.roll_and_move_with(p(1), (2, 2)).unwrap();
        assert!(outcome.passed_go);
        assert_eq!(outcome.new_position, 2);
        // GO bonus, then whatever the chest card did on space 2.
        let Landing::DrewCard { amount, .. } = outcome.landing else {
            panic!("expected a chest card");
        };
        assert_eq!(game.players()[0].money, STARTING_MONEY + GO_BONUS + amount);
    }

    #[test]
    fn test_tax_space_charges() {
        let mut game = two_player_game();
        game.players[0].position = 1;
        let outcome = game.roll_and_move_with(p(1), (1, 2)).unwrap();
        assert_eq!(outcome.new_position, 4);
        assert_eq!(outcome.landing, Landing::PaidTax { amount: 200 });
        assert_eq!(game.players()[0].money, STARTING_MONEY - 200);
    }

    #[test]
    fn test_go_to_jail_repositions() {
        let mut game = two_player_game();
        game.players[0].position = 27;
        let outcome = game.roll_and_move_with(p(1), (1, 2)).unwrap();
        assert_eq!(outcome.landing, Landing::WentToJail);
        assert_eq!(game.players()[0].position, JAIL_POSITION);
        assert!(game.players()[0].in_jail);
    }

    #[test]
    fn test_railroad_rent_scales_with_count() {
        let mut game = two_player_game();
        game.owners[5] = Some(p(1));
        assert_eq!(game.rent_for(5, p(1), 7), 25);
        game.owners[15] = Some(p(1));
        assert_eq!(game.rent_for(5, p(1), 7), 50);
        game.owners[25] = Some(p(1));
        game.owners[35] = Some(p(1));
        assert_eq!(game.rent_for(5, p(1), 7), 200);
    }

    #[test]
    fn test_utility_rent_uses_dice_sum() {
        let mut game = two_player_game();
        game.owners[12] = Some(p(1));
        assert_eq!(game.rent_for(12, p(1), 7), 28);
        game.owners[28] = Some(p(1));
        assert_eq!(game.rent_for(12, p(1), 7), 70);
    }

    #[test]
    fn test_building_costs_by_side() {
        assert_eq!(building_cost(1), 50);
        assert_eq!(building_cost(11), 100);
        assert_eq!(building_cost(21), 150);
        assert_eq!(building_cost(39), 200);
    }

    #[test]
    fn test_buy_building_raises_rent_tier() {
        let mut game = two_player_game();
        game.players[0].position = 3;
        game.players[0].money = 1500;
        game.owners[3] = Some(p(1));
        game.players[0].properties.push(3);

        let houses = game.buy_building(p(1), 3).unwrap();
        assert_eq!(houses, 1);
        assert_eq!(game.players()[0].money, 1450);
        assert_eq!(game.rent_for(3, p(1), 7), 20);

        for expected in 2..=MAX_BUILDINGS {
            assert_eq!(game.buy_building(p(1), 3).unwrap(), expected);
        }
        let err = game.buy_building(p(1), 3).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_buy_building_requires_ownership() {
        let mut game = two_player_game();
        let err = game.buy_building(p(1), 3).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_buy_building_rejects_railroads() {
        let mut game = two_player_game();
        game.owners[5] = Some(p(1));
        let err = game.buy_building(p(1), 5).unwrap_err();
        assert!(matches!(err, GameError::InvalidAction(_)));
    }

    #[test]
    fn test_bankruptcy_releases_holdings_and_decides_winner() {
        let mut game = two_player_game();
        game.owners[39] = Some(p(2));
        game.houses[39] = 5;
        game.players[1].properties.push(39);
        game.players[0].money = 100;
        game.players[0].position = 36;
        game.owners[1] = Some(p(1));
        game.players[0].properties.push(1);

        // Alice lands on Boardwalk with a hotel: rent 2000, bankrupt.
        let outcome = game.roll_and_move_with(p(1), (1, 2)).unwrap();
        assert!(outcome.bankrupted);
        assert_eq!(outcome.winner, Some(p(2)));
        assert_eq!(game.status(), GameStatus::Finished);
        assert!(game.players()[0].bankrupt);
        assert_eq!(game.owner_of(1), None);
        assert!(game.players()[0].properties.is_empty());
        // Bob keeps his own holdings and received the full rent.
        assert_eq!(game.owner_of(39), Some(p(2)));
        assert_eq!(game.players()[1].money, STARTING_MONEY + 2000);
    }

    #[test]
    fn test_turn_skips_bankrupt_players() {
        let mut game = MonopolyGame::new();
        game.add_player(profile(1, "alice")).unwrap();
        game.add_player(profile(2, "bob")).unwrap();
        game.add_player(profile(3, "carol")).unwrap();
        game.start(7).unwrap();
        game.players[1].bankrupt = true;

        game.roll_and_move_with(p(1), (1, 2)).unwrap();
        assert_eq!(game.current_index(), 2);
    }

    #[test]
    fn test_rent_is_zero_sum() {
        let mut game = two_player_game();
        game.owners[3] = Some(p(2));
        game.players[1].properties.push(3);
        game.players[0].position = 0;

        let before = total_money(&game);
        let outcome = game.roll_and_move_with(p(1), (1, 2)).unwrap();
        assert!(matches!(outcome.landing, Landing::PaidRent { .. }));
        assert_eq!(total_money(&game), before);
    }

    #[test]
    fn test_money_changes_only_by_reported_deltas() {
        let mut game = two_player_game();
        let ids = [p(1), p(2)];

        for _ in 0..500 {
            if game.status() != GameStatus::Playing {
                break;
            }
            let seat = game.current_index();
            let before = total_money(&game);
            let outcome = game.roll_and_move(ids[seat]).unwrap();

            let bank_delta = {
                let go = if outcome.passed_go { GO_BONUS } else { 0 };
                let landing = match outcome.landing {
                    Landing::PaidTax { amount } => -amount,
                    Landing::DrewCard { amount, .. } => amount,
                    _ => 0,
                };
                go + landing
            };
            assert_eq!(total_money(&game), before + bank_delta);
        }
    }

    #[test]
    fn test_remove_player_releases_ownership() {
        let mut game = two_player_game();
        game.owners[3] = Some(p(1));
        game.players[0].properties.push(3);

        assert!(game.remove_player(p(1)));
        assert_eq!(game.owner_of(3), None);
        assert_eq!(game.players().len(), 1);
    }

    #[test]
    fn test_timeout_default_advances_turn() {
        let mut game = two_player_game();
        game.apply_timeout_default();
        assert_eq!(game.current_index(), 1);
    }

    #[test]
    fn test_public_state_idempotent() {
        let game = two_player_game();
        let a = serde_json::to_string(&game.public_state()).unwrap();
        let b = serde_json::to_string(&game.public_state()).unwrap();
        assert_eq!(a, b);
    }
}
