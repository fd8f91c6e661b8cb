//! Room state machine
//!
//! This module contains the authoritative per-room game state and every
//! transition over it: lobby management, turn order, answer scoring, round
//! progression, elimination, and the end-of-game standings. The state
//! machine performs no I/O of its own; outbound messages travel through an
//! injected tunnel finder and delayed events through an injected scheduler,
//! so the whole flow can be driven synchronously in tests.
//!
//! Scoring is inverted relative to most quizzes: obscure correct answers
//! score low, and the lowest cumulative score wins. Every sort in this
//! module is ascending for that reason.

use std::{
    collections::{HashMap, HashSet},
    fmt::Debug,
    time::Duration,
};

use garde::Validate;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

use crate::{
    constants::{scoring, settings as settings_limits, timer},
    matcher, names,
    pack::{Category, CategoryKind, Pack},
    room_code::RoomCode,
    session::Tunnel,
    watcher::{self, Id, Role, Watchers},
};

/// Text recorded on the answer board when a turn ends without an answer
const PASS_DISPLAY: &str = "PASS";

/// The phase a room is currently in
///
/// Rooms move `Lobby → Playing ⇄ Revealing → RoundEnd`, looping back to
/// `Playing` for the next round or finishing in `GameOver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    /// Waiting for players before the game starts
    Lobby,
    /// A player's turn is in progress
    Playing,
    /// A submitted answer is being revealed
    Revealing,
    /// Standings between rounds
    RoundEnd,
    /// The game has finished
    GameOver,
}

/// The variant of the game being played
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GameMode {
    /// Everyone plays every round; lowest cumulative score wins
    #[default]
    Party,
    /// The worst round performer is eliminated each round until one remains
    TvShow,
}

/// Host-configurable settings for a game
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Number of rounds to play, clamped down to the number of categories
    /// in the pack
    #[garde(range(min = 1, max = settings_limits::MAX_ROUNDS))]
    pub total_rounds: u32,
    /// Whether turns run against a countdown
    #[garde(skip)]
    pub timer_enabled: bool,
    /// Turn countdown length in seconds
    #[garde(range(min = settings_limits::MIN_TIMER_SECONDS, max = settings_limits::MAX_TIMER_SECONDS))]
    pub timer_seconds: u64,
    /// The game variant
    #[garde(skip)]
    pub mode: GameMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            total_rounds: settings_limits::DEFAULT_ROUNDS,
            timer_enabled: false,
            timer_seconds: settings_limits::DEFAULT_TIMER_SECONDS,
            mode: GameMode::default(),
        }
    }
}

/// One player's record in a room
///
/// Created when a player connection joins; survives transport reconnects
/// and is only removed by an explicit host kick or room destruction.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// The player's identity, preserved across reconnects
    pub id: Id,
    /// Display name (not necessarily unique)
    pub name: String,
    /// The player's preferred language
    pub language: String,
    /// Cumulative score; lower is better
    pub score: u32,
    /// Score earned in each round, indexed by round number
    pub round_scores: Vec<u32>,
    /// The round this player was eliminated in, if any
    pub eliminated_in_round: Option<u32>,
    /// Whether the player currently has a live connection
    pub connected: bool,
    /// Whether the player is typing (UI hint)
    pub typing: bool,
    /// The answer the player submitted this turn (UI hint)
    pub last_answer: Option<String>,
}

impl Player {
    /// Creates a fresh player record
    pub fn new(id: Id, name: String, language: String) -> Self {
        Self {
            id,
            name,
            language,
            score: 0,
            round_scores: Vec::new(),
            eliminated_in_round: None,
            connected: true,
            typing: false,
            last_answer: None,
        }
    }

    /// Clears score and elimination state for a new game
    pub fn reset_for_new_game(&mut self) {
        self.score = 0;
        self.round_scores.clear();
        self.eliminated_in_round = None;
        self.typing = false;
        self.last_answer = None;
    }

    /// Adds to this player's score slot for a round
    ///
    /// Slots accumulate rather than overwrite, and missing slots up to the
    /// round are filled with zero.
    pub fn add_round_score(&mut self, round: u32, score: u32) {
        let index = round.saturating_sub(1) as usize;
        if self.round_scores.len() <= index {
            self.round_scores.resize(index + 1, 0);
        }
        self.round_scores[index] += score;
    }

    /// Returns the score earned in a specific round (zero if absent)
    pub fn round_score(&self, round: u32) -> u32 {
        self.round_scores
            .get(round.saturating_sub(1) as usize)
            .copied()
            .unwrap_or(0)
    }
}

/// One revealed entry on a round's answer board
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardEntry {
    /// The player who answered
    pub player_id: Id,
    /// The text shown on the board
    pub answer: String,
    /// The score charged for this entry
    pub score: u32,
    /// Whether the answer matched the category's answer set
    pub correct: bool,
}

/// A row in round-end or game-end standings, sorted ascending by score
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    /// The player's identity
    pub player_id: Id,
    /// The player's display name
    pub name: String,
    /// The player's cumulative score
    pub score: u32,
}

/// Client-visible view of the current category
///
/// Deliberately excludes the answer list and point values: leaking the
/// answer set defeats the game, so only the prompt, presentation kind, and
/// answer count ever reach clients before reveal.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryView {
    /// The prompt shown to players
    pub prompt: String,
    /// How the prompt is presented
    pub kind: CategoryKind,
    /// How many answers the category holds
    pub answer_count: usize,
}

/// The full (redacted) room state sent to every client
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    /// The room's code
    pub code: RoomCode,
    /// The current phase
    pub phase: Phase,
    /// The active settings
    pub settings: Settings,
    /// All players in turn order
    pub players: Vec<Player>,
    /// The current round number (1-based; 0 before the first game)
    pub round: u32,
    /// The player whose turn it is, if a turn is in progress
    pub current_player_id: Option<Id>,
    /// The current category, if a round is in progress
    pub category: Option<CategoryView>,
    /// The answers revealed so far this round
    pub board: Vec<BoardEntry>,
    /// The running jackpot total
    pub jackpot: u32,
    /// The armed countdown length in seconds, if a timed turn is running
    pub timer_seconds: Option<u64>,
}

/// Inbound wire messages from clients
///
/// Messages are tagged with a `type` field; payload fields are camelCase.
/// Host-only and player-only messages are gated by [`IncomingMessage::follows`];
/// a message from the wrong role is silently dropped.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncomingMessage {
    /// (HOST) Store a pack and settings for the room
    CreateGame {
        /// The pack to play
        pack: Pack,
        /// Settings for the game
        #[serde(default)]
        settings: Settings,
    },
    /// (HOST) Start the game from the lobby
    StartGame,
    /// (HOST) Move on to the next player's turn
    NextPlayer,
    /// (HOST) Move on to the next round
    NextRound,
    /// (HOST) Remove a player from the room
    #[serde(rename_all = "camelCase")]
    KickPlayer {
        /// The player to remove
        player_id: Id,
    },
    /// (PLAYER) Update the sender's name and language
    JoinGame {
        /// The desired display name
        name: String,
        /// The preferred language
        #[serde(default)]
        language: Option<String>,
    },
    /// (PLAYER) Submit an answer for the sender's turn
    SubmitAnswer {
        /// The free-text answer
        answer: String,
    },
    /// (PLAYER) Pass the sender's turn
    Pass,
    /// (PLAYER) Report typing activity
    #[serde(rename_all = "camelCase")]
    Typing {
        /// Whether the sender is typing
        is_typing: bool,
    },
    /// (PLAYER) Change the sender's preferred language
    SetLanguage {
        /// The preferred language
        language: String,
    },
}

impl IncomingMessage {
    /// Validates that a message matches the sender's role
    fn follows(&self, role: Role) -> bool {
        match self {
            Self::CreateGame { .. }
            | Self::StartGame
            | Self::NextPlayer
            | Self::NextRound
            | Self::KickPlayer { .. } => matches!(role, Role::Host),
            Self::JoinGame { .. }
            | Self::SubmitAnswer { .. }
            | Self::Pass
            | Self::Typing { .. }
            | Self::SetLanguage { .. } => matches!(role, Role::Player),
        }
    }
}

/// Dedicated event messages sent to clients
///
/// These are the lightweight notifications thin clients use as animation
/// triggers; the full picture always arrives separately as a
/// [`SyncMessage`].
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateMessage {
    /// Acknowledges a host connection with the room's code
    GameCreated {
        /// The room's code
        code: RoomCode,
    },
    /// A player joined (or rejoined) the room
    PlayerJoined {
        /// The joining player's public record
        player: Player,
    },
    /// A player disconnected or was removed
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        /// The departing player's identity
        player_id: Id,
    },
    /// A player's typing state changed
    #[serde(rename_all = "camelCase")]
    PlayerTyping {
        /// The typing player's identity
        player_id: Id,
        /// Whether they are typing
        is_typing: bool,
    },
    /// A new turn started
    #[serde(rename_all = "camelCase")]
    TurnStart {
        /// The player whose turn it is
        player_id: Id,
        /// That player's display name
        player_name: String,
        /// The countdown length in seconds, if the timer is enabled
        timer_duration: Option<u64>,
    },
    /// A submitted answer was scored
    #[serde(rename_all = "camelCase")]
    ScoreReveal {
        /// The answering player's identity
        player_id: Id,
        /// That player's display name
        player_name: String,
        /// The text shown on the board
        answer: String,
        /// The score charged
        score: u32,
        /// Whether the answer matched the category's answer set
        is_correct: bool,
        /// Whether this was a pointless (zero-scoring) answer
        is_pointless: bool,
    },
    /// A round finished
    #[serde(rename_all = "camelCase")]
    RoundEnd {
        /// Standings of this round's participants, ascending by score
        standings: Vec<Standing>,
        /// The player eliminated this round, if any
        eliminated_player_id: Option<Id>,
    },
    /// The game finished
    GameEnd {
        /// The winner: the lowest cumulative scorer
        winner: Standing,
        /// Final standings over all players, ascending by score
        standings: Vec<Standing>,
    },
    /// A protocol error, sent only to the offending connection
    Error {
        /// Human-readable description of the fault
        message: String,
    },
}

/// Full-state synchronization messages sent to clients
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMessage {
    /// The complete (redacted) room state plus the recipient's identity
    #[serde(rename_all = "camelCase")]
    StateSync {
        /// The room snapshot
        state: RoomSnapshot,
        /// The recipient's own identity
        your_id: Id,
    },
}

/// Scheduled wake-ups delivered back to the state machine
///
/// Alarms are validated against current state when they fire, so a stale
/// or duplicate alarm is a no-op rather than a double-scored turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmMessage {
    /// The turn countdown (plus grace) lapsed; auto-pass if still relevant
    TurnTimeout {
        /// The round the countdown was armed in
        round: u32,
        /// The player the countdown was armed for
        player_id: Id,
    },
}

/// The authoritative state of one room
pub struct Game {
    /// The room's code
    code: RoomCode,
    /// All attached participants and their roles
    watchers: Watchers,
    /// The identity of the current host connection
    host_id: Option<Id>,
    /// The current phase
    phase: Phase,
    /// The active settings
    settings: Settings,
    /// The pack the game draws from
    pack: Option<Pack>,
    /// Category indices pre-selected for each round of the current game
    round_categories: Vec<usize>,
    /// Player identities in seat order
    turn_order: Vec<Id>,
    /// Player records by identity
    players: HashMap<Id, Player>,
    /// The current round number (1-based; 0 before the first game)
    round: u32,
    /// Index into `turn_order` of the current turn
    player_index: usize,
    /// Normalized keys already answered this round
    used_answers: HashSet<String>,
    /// Answers revealed so far this round
    board: Vec<BoardEntry>,
    /// The running jackpot total
    jackpot: u32,
}

impl Debug for Game {
    /// Custom debug implementation that avoids printing large amounts of data
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Game")
            .field("code", &self.code)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

// Accessors
impl Game {
    /// Creates a new room in the lobby phase
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            watchers: Watchers::default(),
            host_id: None,
            phase: Phase::Lobby,
            settings: Settings::default(),
            pack: None,
            round_categories: Vec::new(),
            turn_order: Vec::new(),
            players: HashMap::new(),
            round: 0,
            player_index: 0,
            used_answers: HashSet::new(),
            board: Vec::new(),
            jackpot: 0,
        }
    }

    /// Returns the room's code
    pub fn code(&self) -> RoomCode {
        self.code
    }

    /// Returns the current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the active settings
    pub fn settings(&self) -> Settings {
        self.settings
    }

    /// Returns the current round number
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Returns the running jackpot total
    pub fn jackpot(&self) -> u32 {
        self.jackpot
    }

    /// Returns a player's record
    pub fn player(&self, player_id: Id) -> Option<&Player> {
        self.players.get(&player_id)
    }

    /// Checks whether a player seat exists
    pub fn has_player(&self, player_id: Id) -> bool {
        self.players.contains_key(&player_id)
    }

    /// Returns the answers revealed so far this round
    pub fn board(&self) -> &[BoardEntry] {
        &self.board
    }

    /// Returns the player whose turn is in progress, if any
    pub fn current_player_id(&self) -> Option<Id> {
        match self.phase {
            Phase::Playing | Phase::Revealing => self.turn_order.get(self.player_index).copied(),
            _ => None,
        }
    }

    /// Returns the category for the current round, if one is in progress
    pub fn current_category(&self) -> Option<&Category> {
        if !matches!(
            self.phase,
            Phase::Playing | Phase::Revealing | Phase::RoundEnd
        ) {
            return None;
        }
        let pack = self.pack.as_ref()?;
        let slot = self.round.checked_sub(1)? as usize;
        let index = *self.round_categories.get(slot)?;
        pack.categories.get(index)
    }

    /// Builds the redacted snapshot sent to clients
    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code,
            phase: self.phase,
            settings: self.settings,
            players: self.seats().map(|(_, player)| player.clone()).collect(),
            round: self.round,
            current_player_id: self.current_player_id(),
            category: self.current_category().map(|category| CategoryView {
                prompt: category.prompt.clone(),
                kind: category.kind,
                answer_count: category.answers.len(),
            }),
            board: self.board.clone(),
            jackpot: self.jackpot,
            timer_seconds: (matches!(self.phase, Phase::Playing) && self.settings.timer_enabled)
                .then_some(self.settings.timer_seconds),
        }
    }

    /// Iterates seats as (seat index, player record) in turn order
    fn seats(&self) -> impl Iterator<Item = (usize, &Player)> {
        self.turn_order
            .iter()
            .enumerate()
            .filter_map(|(seat, id)| self.players.get(id).map(|player| (seat, player)))
    }

    /// Sorts rows ascending by cumulative score, breaking ties by seat order
    fn standings<'a, I: Iterator<Item = (usize, &'a Player)>>(rows: I) -> Vec<Standing> {
        rows.sorted_by_key(|(seat, player)| (player.score, *seat))
            .map(|(_, player)| Standing {
                player_id: player.id,
                name: player.name.clone(),
                score: player.score,
            })
            .collect_vec()
    }

    /// Counts players still in the running
    fn active_player_count(&self) -> usize {
        self.seats()
            .filter(|(_, player)| player.eliminated_in_round.is_none())
            .count()
    }
}

// Synchronization
impl Game {
    /// Sends the full snapshot to every attached participant
    ///
    /// Each recipient gets the same snapshot stamped with their own
    /// identity, so clients never have to guess which seat is theirs.
    pub fn sync_all<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, tunnel_finder: F) {
        let state = self.snapshot();
        for (watcher_id, session, _) in self.watchers.vec(&tunnel_finder) {
            session.send_state(&SyncMessage::StateSync {
                state: state.clone(),
                your_id: watcher_id,
            });
        }
    }

    /// Sends the full snapshot to a single participant
    pub fn sync_to<T: Tunnel, F: Fn(Id) -> Option<T>>(&self, watcher_id: Id, tunnel_finder: F) {
        self.watchers.send_state(
            &SyncMessage::StateSync {
                state: self.snapshot(),
                your_id: watcher_id,
            },
            watcher_id,
            tunnel_finder,
        );
    }
}

// Attachment
impl Game {
    /// Attaches a host connection, replacing any previous host
    ///
    /// Host identity is last-wins: a fresh host connection takes over the
    /// room and the previous host connection should be closed by the
    /// caller.
    ///
    /// # Returns
    ///
    /// The identity of the replaced host connection, if there was one
    ///
    /// # Errors
    ///
    /// Returns [`watcher::Error::MaximumParticipants`] if the room is full.
    pub fn attach_host(&mut self, host_id: Id) -> Result<Option<Id>, watcher::Error> {
        let previous = self.host_id.take();
        if let Some(previous_id) = previous {
            self.watchers.remove_watcher(previous_id);
        }
        self.watchers.add_watcher(host_id, Role::Host)?;
        self.host_id = Some(host_id);
        Ok(previous.filter(|id| *id != host_id))
    }

    /// Creates a new player seat and announces it
    ///
    /// Names are sanitized but never deduplicated: two players may share a
    /// display name and remain distinct seats.
    ///
    /// # Errors
    ///
    /// Returns [`watcher::Error::MaximumParticipants`] if the room is full.
    pub fn add_player<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        name: &str,
        language: String,
        tunnel_finder: F,
    ) -> Result<(), watcher::Error> {
        self.watchers.add_watcher(player_id, Role::Player)?;
        let player = Player::new(player_id, names::sanitize(name), language);
        self.turn_order.push(player_id);
        self.players.insert(player_id, player.clone());

        self.sync_all(&tunnel_finder);
        self.watchers
            .announce(&UpdateMessage::PlayerJoined { player }, &tunnel_finder);
        Ok(())
    }

    /// Reattaches a returning player to their existing seat
    ///
    /// Score, seat position, and elimination state are untouched; only the
    /// connectivity flag changes.
    pub fn player_reconnected<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        tunnel_finder: F,
    ) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        player.connected = true;
        let player = player.clone();

        self.sync_all(&tunnel_finder);
        self.watchers
            .announce(&UpdateMessage::PlayerJoined { player }, &tunnel_finder);
    }

    /// Handles a player's transport connection closing
    ///
    /// The seat survives: the record is flagged disconnected and announced.
    /// If it was that player's turn, an automatic pass is recorded so the
    /// game does not stall waiting for them.
    pub fn player_disconnected<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        tunnel_finder: F,
    ) {
        let was_active = matches!(self.phase, Phase::Playing)
            && self.current_player_id() == Some(player_id);

        {
            let Some(player) = self.players.get_mut(&player_id) else {
                return;
            };
            player.connected = false;
            player.typing = false;
        }

        self.sync_all(&tunnel_finder);
        self.watchers
            .announce(&UpdateMessage::PlayerLeft { player_id }, &tunnel_finder);

        if was_active {
            self.submit_answer(player_id, None, &tunnel_finder);
        }
    }
}

// Message handling
impl Game {
    /// Handles an inbound wire message from a participant
    ///
    /// Messages from unknown participants or from the wrong role are
    /// silently dropped: an out-of-turn or unauthorized message is a benign
    /// race, not a fault.
    ///
    /// # Arguments
    ///
    /// * `watcher_id` - The sender's identity
    /// * `message` - The message to process
    /// * `schedule_message` - Capability for arming delayed alarms
    /// * `tunnel_finder` - Function to find participants' tunnels
    pub fn receive_message<T, F, S>(
        &mut self,
        watcher_id: Id,
        message: IncomingMessage,
        mut schedule_message: S,
        tunnel_finder: F,
    ) where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(role) = self.watchers.get_role(watcher_id) else {
            return;
        };

        if !message.follows(role) {
            return;
        }

        match message {
            IncomingMessage::CreateGame { pack, settings } => {
                self.create_game(pack, settings, &tunnel_finder);
            }
            IncomingMessage::StartGame => {
                self.start_game(&mut schedule_message, &tunnel_finder);
            }
            IncomingMessage::NextPlayer => {
                self.advance_turn(&mut schedule_message, &tunnel_finder);
            }
            IncomingMessage::NextRound => {
                self.advance_round(&mut schedule_message, &tunnel_finder);
            }
            IncomingMessage::KickPlayer { player_id } => {
                self.kick_player(player_id, &mut schedule_message, &tunnel_finder);
            }
            IncomingMessage::JoinGame { name, language } => {
                self.rename_player(watcher_id, &name, language, &tunnel_finder);
            }
            IncomingMessage::SubmitAnswer { answer } => {
                self.submit_answer(watcher_id, Some(answer), &tunnel_finder);
            }
            IncomingMessage::Pass => {
                self.submit_answer(watcher_id, None, &tunnel_finder);
            }
            IncomingMessage::Typing { is_typing } => {
                self.set_typing(watcher_id, is_typing, &tunnel_finder);
            }
            IncomingMessage::SetLanguage { language } => {
                self.set_language(watcher_id, language, &tunnel_finder);
            }
        }
    }

    /// Handles a fired alarm
    ///
    /// The alarm carries the round and player it was armed for; if either
    /// no longer matches, or no turn is in progress, the alarm is stale and
    /// nothing happens. This makes cancellation idempotent by construction.
    pub fn receive_alarm<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        message: AlarmMessage,
        tunnel_finder: F,
    ) {
        match message {
            AlarmMessage::TurnTimeout { round, player_id } => {
                if matches!(self.phase, Phase::Playing)
                    && self.round == round
                    && self.current_player_id() == Some(player_id)
                {
                    self.submit_answer(player_id, None, &tunnel_finder);
                }
            }
        }
    }
}

// Game flow
impl Game {
    /// Stores a pack and settings for the room
    ///
    /// Allowed in the lobby, or after a finished game (which returns the
    /// room to the lobby with scores reset). The requested round count is
    /// clamped down to the number of categories the pack can supply.
    pub fn create_game<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        pack: Pack,
        settings: Settings,
        tunnel_finder: F,
    ) {
        if !matches!(self.phase, Phase::Lobby | Phase::GameOver) {
            return;
        }

        let mut settings = settings;
        settings.total_rounds = settings.total_rounds.min(pack.len() as u32).max(1);
        self.settings = settings;
        self.pack = Some(pack);

        if matches!(self.phase, Phase::GameOver) {
            self.phase = Phase::Lobby;
            for player in self.players.values_mut() {
                player.reset_for_new_game();
            }
        }

        self.sync_all(&tunnel_finder);
    }

    /// Starts the game from the lobby
    ///
    /// Resets every player, draws this game's categories from the pack
    /// without replacement (reshuffling the remainder if the pack runs
    /// short), seeds the jackpot, and begins round one.
    pub fn start_game<T, F, S>(&mut self, mut schedule_message: S, tunnel_finder: F)
    where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !matches!(self.phase, Phase::Lobby) || self.turn_order.is_empty() {
            return;
        }
        let category_count = match &self.pack {
            Some(pack) if !pack.is_empty() => pack.len(),
            _ => return,
        };

        for player in self.players.values_mut() {
            player.reset_for_new_game();
        }

        let total_rounds = self.settings.total_rounds.min(category_count as u32).max(1);
        self.settings.total_rounds = total_rounds;

        let mut selected = Vec::with_capacity(total_rounds as usize);
        let mut deck: Vec<usize> = (0..category_count).collect();
        fastrand::shuffle(&mut deck);
        while selected.len() < total_rounds as usize {
            if let Some(index) = deck.pop() {
                selected.push(index);
            } else {
                deck = (0..category_count).collect();
                fastrand::shuffle(&mut deck);
            }
        }
        self.round_categories = selected;

        self.round = 1;
        self.jackpot = scoring::JACKPOT_SEED;
        self.start_round(&mut schedule_message, &tunnel_finder);
    }

    /// Begins the current round
    fn start_round<T, F, S>(&mut self, schedule_message: S, tunnel_finder: F)
    where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        self.used_answers.clear();
        self.board.clear();
        self.player_index = 0;
        self.phase = Phase::Playing;
        self.start_player_turn(schedule_message, tunnel_finder);
    }

    /// Begins the turn of the player at the current seat index
    ///
    /// Eliminated and disconnected players are skipped; if the index runs
    /// past the end of the turn order, the round ends instead. Otherwise
    /// the player's per-turn hints are cleared, the countdown is armed when
    /// enabled, and the turn is announced.
    fn start_player_turn<T, F, S>(&mut self, mut schedule_message: S, tunnel_finder: F)
    where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        loop {
            let Some(player_id) = self.turn_order.get(self.player_index).copied() else {
                self.end_round(&tunnel_finder);
                return;
            };

            let eligible = self
                .players
                .get(&player_id)
                .is_some_and(|player| player.eliminated_in_round.is_none() && player.connected);
            if !eligible {
                self.player_index += 1;
                continue;
            }

            let player_name = {
                let Some(player) = self.players.get_mut(&player_id) else {
                    return;
                };
                player.typing = false;
                player.last_answer = None;
                player.name.clone()
            };

            let timer_duration = self
                .settings
                .timer_enabled
                .then_some(self.settings.timer_seconds);
            if let Some(seconds) = timer_duration {
                schedule_message(
                    AlarmMessage::TurnTimeout {
                        round: self.round,
                        player_id,
                    },
                    Duration::from_secs(seconds + timer::GRACE_SECONDS),
                );
            }

            self.sync_all(&tunnel_finder);
            self.watchers.announce(
                &UpdateMessage::TurnStart {
                    player_id,
                    player_name,
                    timer_duration,
                },
                &tunnel_finder,
            );
            return;
        }
    }

    /// Scores a submitted answer (or pass) for the current turn
    ///
    /// Rejected as a no-op unless the sender is the player whose turn it
    /// is. Resolution order: an empty submission is a pass (penalty); a
    /// key already used this round is a duplicate (penalty, regardless of
    /// whether the text would otherwise be a valid answer); a key the
    /// matcher resolves scores the answer's point value and feeds the
    /// jackpot when pointless; anything else is a miss (penalty).
    pub fn submit_answer<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        answer: Option<String>,
        tunnel_finder: F,
    ) {
        if !matches!(self.phase, Phase::Playing) || self.current_player_id() != Some(player_id) {
            return;
        }

        let trimmed = answer.as_deref().map(str::trim).unwrap_or_default().to_owned();

        let (display, score, correct, used_key) = if trimmed.is_empty() {
            (PASS_DISPLAY.to_owned(), scoring::PENALTY_SCORE, false, None)
        } else {
            let key = matcher::normalize(&trimmed);
            if self.used_answers.contains(&key) {
                (trimmed.clone(), scoring::PENALTY_SCORE, false, None)
            } else {
                match self
                    .current_category()
                    .and_then(|category| matcher::resolve(category, &key))
                {
                    Some(matched) => (matched.text.clone(), matched.points, true, Some(key)),
                    None => (trimmed.clone(), scoring::PENALTY_SCORE, false, None),
                }
            }
        };

        if let Some(key) = used_key {
            self.used_answers.insert(key);
            if score == 0 {
                self.jackpot += scoring::JACKPOT_INCREMENT;
            }
        }

        let round = self.round;
        let player_name = {
            let Some(player) = self.players.get_mut(&player_id) else {
                return;
            };
            player.score += score;
            player.add_round_score(round, score);
            player.typing = false;
            player.last_answer = Some(display.clone());
            player.name.clone()
        };

        self.board.push(BoardEntry {
            player_id,
            answer: display.clone(),
            score,
            correct,
        });
        self.phase = Phase::Revealing;

        self.sync_all(&tunnel_finder);
        self.watchers.announce(
            &UpdateMessage::ScoreReveal {
                player_id,
                player_name,
                answer: display,
                score,
                is_correct: correct,
                is_pointless: correct && score == 0,
            },
            &tunnel_finder,
        );
    }

    /// Moves on to the next seat's turn
    pub fn advance_turn<T, F, S>(&mut self, schedule_message: S, tunnel_finder: F)
    where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !matches!(self.phase, Phase::Playing | Phase::Revealing) {
            return;
        }
        self.phase = Phase::Playing;
        self.player_index += 1;
        self.start_player_turn(schedule_message, tunnel_finder);
    }

    /// Ends the current round
    ///
    /// Computes this round's standings (ascending by cumulative score). In
    /// tv-show mode with more than one player still in the running, the
    /// worst round performer is eliminated; ties go to the earliest seat.
    /// The newly eliminated player still appears in this round's standings.
    fn end_round<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        self.phase = Phase::RoundEnd;
        let round = self.round;

        let eliminated_player_id = if matches!(self.settings.mode, GameMode::TvShow) {
            let target = {
                let active = self
                    .seats()
                    .filter(|(_, player)| player.eliminated_in_round.is_none())
                    .collect_vec();
                if active.len() > 1 {
                    active
                        .iter()
                        .min_by_key(|(seat, player)| {
                            (std::cmp::Reverse(player.round_score(round)), *seat)
                        })
                        .map(|(_, player)| player.id)
                } else {
                    None
                }
            };
            if let Some(target_id) = target {
                if let Some(player) = self.players.get_mut(&target_id) {
                    player.eliminated_in_round = Some(round);
                }
            }
            target
        } else {
            None
        };

        let standings = Self::standings(self.seats().filter(|(_, player)| {
            player.eliminated_in_round.is_none_or(|r| r == round)
        }));

        self.sync_all(&tunnel_finder);
        self.watchers.announce(
            &UpdateMessage::RoundEnd {
                standings,
                eliminated_player_id,
            },
            &tunnel_finder,
        );
    }

    /// Moves on to the next round, or ends the game
    ///
    /// The game ends when the final round has been played or at most one
    /// player remains in the running.
    pub fn advance_round<T, F, S>(&mut self, schedule_message: S, tunnel_finder: F)
    where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        if !matches!(self.phase, Phase::RoundEnd) {
            return;
        }

        if self.round >= self.settings.total_rounds || self.active_player_count() <= 1 {
            self.end_game(&tunnel_finder);
        } else {
            self.round += 1;
            self.start_round(schedule_message, tunnel_finder);
        }
    }

    /// Ends the game and announces the winner
    ///
    /// Final standings cover all players, eliminated ones included, sorted
    /// ascending by cumulative score. The winner is the first row; a tie
    /// goes to the earliest seat.
    fn end_game<T: Tunnel, F: Fn(Id) -> Option<T>>(&mut self, tunnel_finder: F) {
        self.phase = Phase::GameOver;

        let standings = Self::standings(self.seats());
        self.sync_all(&tunnel_finder);
        if let Some(winner) = standings.first().cloned() {
            self.watchers.announce(
                &UpdateMessage::GameEnd { winner, standings },
                &tunnel_finder,
            );
        }
    }

    /// Removes a player from the room entirely
    ///
    /// Unlike a disconnect, a kick deletes the seat. If it was the kicked
    /// player's turn, the next eligible seat starts immediately (or the
    /// round ends).
    pub fn kick_player<T, F, S>(&mut self, target: Id, schedule_message: S, tunnel_finder: F)
    where
        T: Tunnel,
        F: Fn(Id) -> Option<T>,
        S: FnMut(AlarmMessage, Duration),
    {
        let Some(position) = self.turn_order.iter().position(|id| *id == target) else {
            return;
        };
        let was_current = matches!(self.phase, Phase::Playing | Phase::Revealing)
            && self.player_index == position;

        self.turn_order.remove(position);
        self.players.remove(&target);
        self.watchers.remove_watcher(target);
        self.watchers.remove_watcher_session(target, &tunnel_finder);
        if position < self.player_index {
            self.player_index -= 1;
        }

        self.sync_all(&tunnel_finder);
        self.watchers
            .announce(&UpdateMessage::PlayerLeft { player_id: target }, &tunnel_finder);

        if was_current {
            self.phase = Phase::Playing;
            self.start_player_turn(schedule_message, &tunnel_finder);
        }
    }

    /// Updates a player's display name and language
    pub fn rename_player<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        name: &str,
        language: Option<String>,
        tunnel_finder: F,
    ) {
        {
            let Some(player) = self.players.get_mut(&player_id) else {
                return;
            };
            player.name = names::sanitize(name);
            if let Some(language) = language {
                player.language = language;
            }
        }
        self.sync_all(&tunnel_finder);
    }

    /// Updates a player's typing hint and broadcasts it
    ///
    /// Typing is a transient UI hint; it does not trigger a full snapshot.
    pub fn set_typing<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        is_typing: bool,
        tunnel_finder: F,
    ) {
        let Some(player) = self.players.get_mut(&player_id) else {
            return;
        };
        player.typing = is_typing;
        self.watchers.announce(
            &UpdateMessage::PlayerTyping {
                player_id,
                is_typing,
            },
            &tunnel_finder,
        );
    }

    /// Updates a player's preferred language
    pub fn set_language<T: Tunnel, F: Fn(Id) -> Option<T>>(
        &mut self,
        player_id: Id,
        language: String,
        tunnel_finder: F,
    ) {
        {
            let Some(player) = self.players.get_mut(&player_id) else {
                return;
            };
            player.language = language;
        }
        self.sync_all(&tunnel_finder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, Default)]
    struct MockTunnel {
        messages: Arc<Mutex<Vec<UpdateMessage>>>,
        states: Arc<Mutex<Vec<SyncMessage>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Tunnel for MockTunnel {
        fn send_message(&self, message: &UpdateMessage) {
            self.messages.lock().unwrap().push(message.clone());
        }

        fn send_state(&self, state: &SyncMessage) {
            self.states.lock().unwrap().push(state.clone());
        }

        fn close(self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    impl MockTunnel {
        fn turn_starts(&self) -> Vec<Id> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .filter_map(|message| match message {
                    UpdateMessage::TurnStart { player_id, .. } => Some(*player_id),
                    _ => None,
                })
                .collect()
        }

        fn last_round_end(&self) -> Option<(Vec<Standing>, Option<Id>)> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|message| match message {
                    UpdateMessage::RoundEnd {
                        standings,
                        eliminated_player_id,
                    } => Some((standings.clone(), *eliminated_player_id)),
                    _ => None,
                })
        }

        fn last_game_end(&self) -> Option<(Standing, Vec<Standing>)> {
            self.messages
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find_map(|message| match message {
                    UpdateMessage::GameEnd { winner, standings } => {
                        Some((winner.clone(), standings.clone()))
                    }
                    _ => None,
                })
        }
    }

    // Both categories carry the same answer set so tests are independent of
    // which category the shuffle assigns to which round.
    fn test_pack() -> Pack {
        let answers = serde_json::json!([
            { "text": "France", "points": 90 },
            { "text": "Iceland", "points": 30 },
            { "text": "Malta", "points": 5 },
            { "text": "Andorra", "points": 0 },
        ]);
        serde_json::from_value(serde_json::json!({
            "categories": [
                { "prompt": "European countries", "answers": answers.clone() },
                { "prompt": "More European countries", "answers": answers },
            ],
        }))
        .unwrap()
    }

    struct Fixture {
        game: Game,
        tunnels: std::collections::HashMap<Id, MockTunnel>,
        host: Id,
        players: Vec<Id>,
        alarms: Vec<(AlarmMessage, Duration)>,
    }

    impl Fixture {
        fn new(player_count: usize) -> Self {
            let mut game = Game::new(RoomCode::from_str("GAME").unwrap());
            let mut tunnels = std::collections::HashMap::new();

            let host = Id::new();
            tunnels.insert(host, MockTunnel::default());
            game.attach_host(host).unwrap();

            let players: Vec<Id> = (0..player_count).map(|_| Id::new()).collect();
            for player_id in &players {
                tunnels.insert(*player_id, MockTunnel::default());
            }
            for (index, player_id) in players.iter().enumerate() {
                let finder = |id: Id| tunnels.get(&id).cloned();
                game.add_player(*player_id, &format!("Player {index}"), "en".to_owned(), finder)
                    .unwrap();
            }

            Self {
                game,
                tunnels,
                host,
                players,
                alarms: Vec::new(),
            }
        }

        fn host_tunnel(&self) -> &MockTunnel {
            &self.tunnels[&self.host]
        }

        fn send(&mut self, sender: Id, message: IncomingMessage) {
            let finder = |id: Id| self.tunnels.get(&id).cloned();
            let alarms = &mut self.alarms;
            self.game.receive_message(
                sender,
                message,
                |alarm, duration| alarms.push((alarm, duration)),
                finder,
            );
        }

        fn create_and_start(&mut self, settings: Settings) {
            self.send(
                self.host,
                IncomingMessage::CreateGame {
                    pack: test_pack(),
                    settings,
                },
            );
            self.send(self.host, IncomingMessage::StartGame);
        }
    }

    #[test]
    fn test_settings_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.total_rounds, 5);
        assert!(!settings.timer_enabled);
        assert_eq!(settings.timer_seconds, 30);
        assert_eq!(settings.mode, GameMode::Party);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_create_game_clamps_rounds_to_categories() {
        let mut fixture = Fixture::new(1);
        fixture.send(
            fixture.host,
            IncomingMessage::CreateGame {
                pack: test_pack(),
                settings: Settings {
                    total_rounds: 5,
                    ..Settings::default()
                },
            },
        );

        assert_eq!(fixture.game.settings().total_rounds, 2);
        assert_eq!(fixture.game.phase(), Phase::Lobby);
    }

    #[test]
    fn test_start_game_requires_players_and_pack() {
        let mut fixture = Fixture::new(0);
        fixture.send(
            fixture.host,
            IncomingMessage::CreateGame {
                pack: test_pack(),
                settings: Settings::default(),
            },
        );
        fixture.send(fixture.host, IncomingMessage::StartGame);
        assert_eq!(fixture.game.phase(), Phase::Lobby);

        let mut fixture = Fixture::new(1);
        fixture.send(fixture.host, IncomingMessage::StartGame);
        assert_eq!(fixture.game.phase(), Phase::Lobby);
    }

    #[test]
    fn test_start_game_enters_first_turn() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings::default());

        assert_eq!(fixture.game.phase(), Phase::Playing);
        assert_eq!(fixture.game.round(), 1);
        assert_eq!(fixture.game.jackpot(), 1000);
        assert_eq!(fixture.game.current_player_id(), Some(fixture.players[0]));
        assert_eq!(fixture.host_tunnel().turn_starts(), vec![fixture.players[0]]);
        assert!(fixture.alarms.is_empty());
    }

    #[test]
    fn test_role_gating_ignores_wrong_sender() {
        let mut fixture = Fixture::new(1);
        let player = fixture.players[0];

        fixture.send(player, IncomingMessage::StartGame);
        assert_eq!(fixture.game.phase(), Phase::Lobby);

        fixture.create_and_start(Settings::default());
        fixture.send(
            fixture.host,
            IncomingMessage::SubmitAnswer {
                answer: "France".to_owned(),
            },
        );
        assert!(fixture.game.board().is_empty());
    }

    #[test]
    fn test_scoring_scenario_with_duplicate_and_jackpot() {
        let mut fixture = Fixture::new(3);
        fixture.create_and_start(Settings {
            total_rounds: 1,
            ..Settings::default()
        });
        let [p1, p2, p3] = [fixture.players[0], fixture.players[1], fixture.players[2]];

        fixture.send(
            p1,
            IncomingMessage::SubmitAnswer {
                answer: "france".to_owned(),
            },
        );
        assert_eq!(fixture.game.phase(), Phase::Revealing);
        assert_eq!(fixture.game.player(p1).unwrap().score, 90);
        let entry = &fixture.game.board()[0];
        assert_eq!(entry.answer, "France");
        assert!(entry.correct);

        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(
            p2,
            IncomingMessage::SubmitAnswer {
                answer: "FRANCE".to_owned(),
            },
        );
        assert_eq!(fixture.game.player(p2).unwrap().score, 100);
        assert!(!fixture.game.board()[1].correct);

        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(
            p3,
            IncomingMessage::SubmitAnswer {
                answer: "Andorra".to_owned(),
            },
        );
        let entry = &fixture.game.board()[2];
        assert_eq!(entry.score, 0);
        assert!(entry.correct);
        assert_eq!(fixture.game.jackpot(), 1250);

        let reveal = fixture
            .tunnels[&p3]
            .messages
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|message| match message {
                UpdateMessage::ScoreReveal {
                    is_pointless,
                    is_correct,
                    score,
                    ..
                } => Some((*is_pointless, *is_correct, *score)),
                _ => None,
            })
            .unwrap();
        assert_eq!(reveal, (true, true, 0));
    }

    #[test]
    fn test_out_of_turn_submission_is_ignored() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings::default());
        let bystander = fixture.players[1];

        fixture.send(
            bystander,
            IncomingMessage::SubmitAnswer {
                answer: "France".to_owned(),
            },
        );

        assert_eq!(fixture.game.phase(), Phase::Playing);
        assert!(fixture.game.board().is_empty());
        assert_eq!(fixture.game.player(bystander).unwrap().score, 0);
    }

    #[test]
    fn test_pass_scores_penalty() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings::default());
        let p1 = fixture.players[0];

        fixture.send(p1, IncomingMessage::Pass);

        let entry = &fixture.game.board()[0];
        assert_eq!(entry.answer, "PASS");
        assert_eq!(entry.score, 100);
        assert!(!entry.correct);
        assert_eq!(fixture.game.player(p1).unwrap().round_score(1), 100);
    }

    #[test]
    fn test_unrecognized_answer_scores_penalty() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings::default());
        let p1 = fixture.players[0];

        fixture.send(
            p1,
            IncomingMessage::SubmitAnswer {
                answer: "Atlantis".to_owned(),
            },
        );

        let entry = &fixture.game.board()[0];
        assert_eq!(entry.answer, "Atlantis");
        assert_eq!(entry.score, 100);
        assert!(!entry.correct);
    }

    #[test]
    fn test_round_ends_after_last_turn_and_used_answers_reset() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings {
            total_rounds: 2,
            ..Settings::default()
        });
        let [p1, p2] = [fixture.players[0], fixture.players[1]];

        fixture.send(
            p1,
            IncomingMessage::SubmitAnswer {
                answer: "Malta".to_owned(),
            },
        );
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(
            p2,
            IncomingMessage::SubmitAnswer {
                answer: "Malta".to_owned(),
            },
        );
        assert_eq!(fixture.game.player(p2).unwrap().score, 100);
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        assert_eq!(fixture.game.phase(), Phase::RoundEnd);

        fixture.send(fixture.host, IncomingMessage::NextRound);
        assert_eq!(fixture.game.phase(), Phase::Playing);
        assert_eq!(fixture.game.round(), 2);
        assert!(fixture.game.used_answers.is_empty());
        assert!(fixture.game.board().is_empty());

        // The duplicate ledger is per round: the same answer scores again.
        fixture.send(
            p1,
            IncomingMessage::SubmitAnswer {
                answer: "Malta".to_owned(),
            },
        );
        assert_eq!(fixture.game.player(p1).unwrap().round_score(2), 5);
    }

    #[test]
    fn test_tv_show_round_end_eliminates_worst_performer() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings {
            total_rounds: 2,
            mode: GameMode::TvShow,
            ..Settings::default()
        });
        let [a, b] = [fixture.players[0], fixture.players[1]];

        fixture.send(a, IncomingMessage::Pass);
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(
            b,
            IncomingMessage::SubmitAnswer {
                answer: "Iceland".to_owned(),
            },
        );
        fixture.send(fixture.host, IncomingMessage::NextPlayer);

        assert_eq!(fixture.game.phase(), Phase::RoundEnd);
        assert_eq!(fixture.game.player(a).unwrap().eliminated_in_round, Some(1));
        assert!(fixture.game.player(b).unwrap().eliminated_in_round.is_none());

        let (standings, eliminated) = fixture.host_tunnel().last_round_end().unwrap();
        assert_eq!(eliminated, Some(a));
        assert_eq!(standings.len(), 2);
        assert_eq!(standings[0].player_id, b);
        assert_eq!(standings[0].score, 30);
        assert_eq!(standings[1].player_id, a);
        assert_eq!(standings[1].score, 100);

        // One active player left: advancing ends the game instead.
        fixture.send(fixture.host, IncomingMessage::NextRound);
        assert_eq!(fixture.game.phase(), Phase::GameOver);
        let (winner, _) = fixture.host_tunnel().last_game_end().unwrap();
        assert_eq!(winner.player_id, b);
    }

    #[test]
    fn test_eliminated_player_skipped_in_later_rounds() {
        let mut fixture = Fixture::new(3);
        fixture.create_and_start(Settings {
            total_rounds: 2,
            mode: GameMode::TvShow,
            ..Settings::default()
        });
        let [a, b, c] = [fixture.players[0], fixture.players[1], fixture.players[2]];

        fixture.send(a, IncomingMessage::Pass);
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(
            b,
            IncomingMessage::SubmitAnswer {
                answer: "Malta".to_owned(),
            },
        );
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(
            c,
            IncomingMessage::SubmitAnswer {
                answer: "Iceland".to_owned(),
            },
        );
        fixture.send(fixture.host, IncomingMessage::NextPlayer);

        assert_eq!(fixture.game.player(a).unwrap().eliminated_in_round, Some(1));

        fixture.send(fixture.host, IncomingMessage::NextRound);
        assert_eq!(fixture.game.round(), 2);
        // Round two opens with seat B, not the eliminated seat A.
        assert_eq!(fixture.game.current_player_id(), Some(b));
    }

    #[test]
    fn test_game_end_winner_is_lowest_scorer_tie_by_seat() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings {
            total_rounds: 1,
            ..Settings::default()
        });
        let [a, b] = [fixture.players[0], fixture.players[1]];

        fixture.send(a, IncomingMessage::Pass);
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(b, IncomingMessage::Pass);
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(fixture.host, IncomingMessage::NextRound);

        assert_eq!(fixture.game.phase(), Phase::GameOver);
        let (winner, standings) = fixture.host_tunnel().last_game_end().unwrap();
        assert_eq!(winner.player_id, a);
        assert_eq!(standings.len(), 2);
        assert_eq!(standings[0].player_id, a);
        assert_eq!(standings[1].player_id, b);
    }

    #[test]
    fn test_disconnect_of_active_player_auto_passes() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings::default());
        let p1 = fixture.players[0];

        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.player_disconnected(p1, finder);

        assert_eq!(fixture.game.phase(), Phase::Revealing);
        assert!(!fixture.game.player(p1).unwrap().connected);
        let entry = &fixture.game.board()[0];
        assert_eq!(entry.player_id, p1);
        assert_eq!(entry.answer, "PASS");
        assert_eq!(entry.score, 100);
    }

    #[test]
    fn test_disconnected_player_skipped_at_turn_start() {
        let mut fixture = Fixture::new(2);
        let [p1, p2] = [fixture.players[0], fixture.players[1]];

        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.player_disconnected(p1, finder);

        fixture.create_and_start(Settings::default());
        assert_eq!(fixture.game.current_player_id(), Some(p2));
    }

    #[test]
    fn test_reconnect_preserves_seat_and_score() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings::default());
        let p1 = fixture.players[0];

        fixture.send(
            p1,
            IncomingMessage::SubmitAnswer {
                answer: "France".to_owned(),
            },
        );

        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.player_disconnected(p1, finder);
        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.player_reconnected(p1, finder);

        let player = fixture.game.player(p1).unwrap();
        assert!(player.connected);
        assert_eq!(player.score, 90);
        assert_eq!(fixture.game.turn_order[0], p1);
    }

    #[test]
    fn test_timer_armed_with_grace() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings {
            timer_enabled: true,
            timer_seconds: 30,
            ..Settings::default()
        });

        assert_eq!(fixture.alarms.len(), 1);
        let (alarm, duration) = fixture.alarms[0];
        assert_eq!(
            alarm,
            AlarmMessage::TurnTimeout {
                round: 1,
                player_id: fixture.players[0],
            }
        );
        assert_eq!(duration, Duration::from_secs(32));
    }

    #[test]
    fn test_alarm_valid_fires_auto_pass() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings {
            timer_enabled: true,
            ..Settings::default()
        });
        let p1 = fixture.players[0];

        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.receive_alarm(
            AlarmMessage::TurnTimeout {
                round: 1,
                player_id: p1,
            },
            finder,
        );

        assert_eq!(fixture.game.phase(), Phase::Revealing);
        assert_eq!(fixture.game.board()[0].answer, "PASS");
    }

    #[test]
    fn test_stale_alarm_is_ignored() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings {
            timer_enabled: true,
            ..Settings::default()
        });
        let [p1, p2] = [fixture.players[0], fixture.players[1]];

        // Wrong player: armed for a turn that is no longer in progress.
        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.receive_alarm(
            AlarmMessage::TurnTimeout {
                round: 1,
                player_id: p2,
            },
            finder,
        );
        assert_eq!(fixture.game.phase(), Phase::Playing);
        assert!(fixture.game.board().is_empty());

        // Right player, wrong round.
        let finder = |id: Id| fixture.tunnels.get(&id).cloned();
        fixture.game.receive_alarm(
            AlarmMessage::TurnTimeout {
                round: 2,
                player_id: p1,
            },
            finder,
        );
        assert!(fixture.game.board().is_empty());
    }

    #[test]
    fn test_kick_removes_seat_and_restarts_turn() {
        let mut fixture = Fixture::new(2);
        fixture.create_and_start(Settings::default());
        let [p1, p2] = [fixture.players[0], fixture.players[1]];

        fixture.send(fixture.host, IncomingMessage::KickPlayer { player_id: p1 });

        assert!(!fixture.game.has_player(p1));
        assert_eq!(fixture.game.current_player_id(), Some(p2));
        assert!(*fixture.tunnels[&p1].closed.lock().unwrap());
    }

    #[test]
    fn test_snapshot_never_leaks_answers() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings::default());

        let snapshot = fixture.game.snapshot();
        let category = snapshot.category.as_ref().unwrap();
        assert_eq!(category.answer_count, 4);

        let encoded = serde_json::to_string(&SyncMessage::StateSync {
            state: snapshot,
            your_id: fixture.players[0],
        })
        .unwrap();
        for secret in ["France", "Iceland", "Malta", "Andorra", "\"points\""] {
            assert!(!encoded.contains(secret), "snapshot leaked {secret}");
        }
        assert!(encoded.contains("European countries"));
    }

    #[test]
    fn test_snapshot_shows_revealed_board_entries() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings::default());
        let p1 = fixture.players[0];

        fixture.send(
            p1,
            IncomingMessage::SubmitAnswer {
                answer: "Malta".to_owned(),
            },
        );

        let encoded = serde_json::to_string(&fixture.game.snapshot()).unwrap();
        assert!(encoded.contains("Malta"));
        assert!(!encoded.contains("Andorra"));
    }

    #[test]
    fn test_round_score_accumulates() {
        let mut player = Player::new(Id::new(), "Test".to_owned(), "en".to_owned());
        player.add_round_score(2, 30);
        player.add_round_score(2, 100);

        assert_eq!(player.round_scores, vec![0, 130]);
        assert_eq!(player.round_score(2), 130);
        assert_eq!(player.round_score(1), 0);
        assert_eq!(player.round_score(9), 0);
    }

    #[test]
    fn test_create_game_after_game_over_returns_to_lobby() {
        let mut fixture = Fixture::new(1);
        fixture.create_and_start(Settings {
            total_rounds: 1,
            ..Settings::default()
        });
        let p1 = fixture.players[0];

        fixture.send(p1, IncomingMessage::Pass);
        fixture.send(fixture.host, IncomingMessage::NextPlayer);
        fixture.send(fixture.host, IncomingMessage::NextRound);
        assert_eq!(fixture.game.phase(), Phase::GameOver);

        fixture.send(
            fixture.host,
            IncomingMessage::CreateGame {
                pack: test_pack(),
                settings: Settings::default(),
            },
        );
        assert_eq!(fixture.game.phase(), Phase::Lobby);
        assert_eq!(fixture.game.player(p1).unwrap().score, 0);
    }

    #[test]
    fn test_host_takeover_replaces_previous_host() {
        let mut fixture = Fixture::new(1);
        let new_host = Id::new();
        fixture.tunnels.insert(new_host, MockTunnel::default());

        let replaced = fixture.game.attach_host(new_host).unwrap();
        assert_eq!(replaced, Some(fixture.host));

        // The old host identity no longer passes the role gate.
        fixture.send(fixture.host, IncomingMessage::StartGame);
        assert_eq!(fixture.game.phase(), Phase::Lobby);
    }

    #[test]
    fn test_join_game_renames_seat() {
        let mut fixture = Fixture::new(1);
        let p1 = fixture.players[0];

        fixture.send(
            p1,
            IncomingMessage::JoinGame {
                name: "  Fresh   Name ".to_owned(),
                language: Some("fr".to_owned()),
            },
        );

        let player = fixture.game.player(p1).unwrap();
        assert_eq!(player.name, "Fresh Name");
        assert_eq!(player.language, "fr");
    }

    #[test]
    fn test_typing_broadcasts_hint_only() {
        let mut fixture = Fixture::new(1);
        let p1 = fixture.players[0];
        let syncs_before = fixture.host_tunnel().states.lock().unwrap().len();

        fixture.send(p1, IncomingMessage::Typing { is_typing: true });

        assert!(fixture.game.player(p1).unwrap().typing);
        let hint = fixture
            .host_tunnel()
            .messages
            .lock()
            .unwrap()
            .iter()
            .any(|message| matches!(message, UpdateMessage::PlayerTyping { is_typing: true, .. }));
        assert!(hint);
        assert_eq!(
            fixture.host_tunnel().states.lock().unwrap().len(),
            syncs_before
        );
    }

    #[test]
    fn test_wire_message_parsing() {
        let message: IncomingMessage =
            serde_json::from_str(r#"{"type":"SUBMIT_ANSWER","answer":"France"}"#).unwrap();
        assert!(matches!(
            message,
            IncomingMessage::SubmitAnswer { answer } if answer == "France"
        ));

        let message: IncomingMessage =
            serde_json::from_str(r#"{"type":"TYPING","isTyping":true}"#).unwrap();
        assert!(matches!(message, IncomingMessage::Typing { is_typing: true }));

        let message: IncomingMessage = serde_json::from_str(r#"{"type":"PASS"}"#).unwrap();
        assert!(matches!(message, IncomingMessage::Pass));

        assert!(serde_json::from_str::<IncomingMessage>(r#"{"type":"NOT_A_THING"}"#).is_err());
    }

    #[test]
    fn test_wire_message_encoding() {
        let encoded = serde_json::to_string(&UpdateMessage::TurnStart {
            player_id: Id::new(),
            player_name: "Ada".to_owned(),
            timer_duration: None,
        })
        .unwrap();
        assert!(encoded.contains("\"type\":\"TURN_START\""));
        assert!(encoded.contains("\"playerName\":\"Ada\""));
        assert!(!encoded.contains("timerDuration"));

        let encoded = serde_json::to_string(&UpdateMessage::GameCreated {
            code: RoomCode::from_str("GAME").unwrap(),
        })
        .unwrap();
        assert!(encoded.contains("\"type\":\"GAME_CREATED\""));
        assert!(encoded.contains("\"code\":\"GAME\""));
    }
}
