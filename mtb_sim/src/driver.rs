//! Seeded differential driver for the ATM.
//!
//! The driver picks abstract [`Intent`]s at random and turns each into a
//! proxy call only if the oracle's current state enables it, the same way a
//! rule-based state machine test guards its rules with preconditions. Every
//! call reaches the oracle first and the real ATM second, so the first
//! disagreement stops the run with a reproducible call log.

use crate::atm::{Atm, AtmError, AtmOracle, AtmState, Card, MenuItem, RealAtm, MAX_PIN_TRIES};
use mtb_proxy::{replay, Call, CallLog, Lifecycle, Proxy, Shared};
use rand::seq::SliceRandom;
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, info, warn};

const CARD_HOLDERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

/// An abstract driver step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intent {
    InsertCard(Card),
    /// `guess` is used only when `correct` is false
    EnterPin { correct: bool, guess: String },
    Cancel,
    ReturnCard,
    ChooseMenuItem(MenuItem),
    ChooseWithdrawAmount(u64),
}

impl Intent {
    /// Draws a random intent.
    pub fn random(rng: &mut impl Rng, cards: &[Card]) -> Self {
        match rng.gen_range(0..6) {
            0 => match cards.choose(rng) {
                Some(card) => Intent::InsertCard(card.clone()),
                None => Intent::InsertCard(random_card(rng)),
            },
            1 => Intent::EnterPin {
                correct: rng.gen_bool(0.5),
                guess: random_pin(rng),
            },
            2 => Intent::Cancel,
            3 => Intent::ReturnCard,
            4 => Intent::ChooseMenuItem(MenuItem::ALL[rng.gen_range(0..MenuItem::ALL.len())]),
            _ => Intent::ChooseWithdrawAmount(rng.gen_range(1..=50) * 10),
        }
    }

    /// Name of the proxy operation this intent maps to.
    pub fn operation(&self) -> &'static str {
        match self {
            Intent::InsertCard(_) => "insert_card",
            Intent::EnterPin { .. } => "enter_pin",
            Intent::Cancel => "cancel",
            Intent::ReturnCard => "return_card",
            Intent::ChooseMenuItem(_) => "choose_menu_item",
            Intent::ChooseWithdrawAmount(_) => "choose_withdraw_amount",
        }
    }
}

fn random_pin(rng: &mut impl Rng) -> String {
    format!("{:04}", rng.gen_range(0..10_000))
}

fn random_card(rng: &mut impl Rng) -> Card {
    let name = CARD_HOLDERS[rng.gen_range(0..CARD_HOLDERS.len())];
    Card::new(name, random_pin(rng))
}

/// Proxy over an oracle and a real ATM.
pub struct AtmHarness {
    oracle: Shared<AtmOracle>,
    real: Shared<RealAtm>,
    proxy: Proxy<dyn Atm>,
    log: CallLog,
}

impl AtmHarness {
    /// Builds a harness around `real`, recording into a fresh log.
    pub fn new(real: RealAtm) -> Result<Self, AtmError> {
        Self::with_log(real, CallLog::new())
    }

    pub fn with_log(real: RealAtm, log: CallLog) -> Result<Self, AtmError> {
        let oracle = Rc::new(RefCell::new(AtmOracle::new()));
        let real = Rc::new(RefCell::new(real));
        let targets = vec![
            oracle.clone() as Shared<dyn Atm>,
            real.clone() as Shared<dyn Atm>,
        ];
        let proxy = Proxy::new(targets, log.clone())?;

        Ok(Self {
            oracle,
            real,
            proxy,
            log,
        })
    }

    pub fn oracle_state(&self) -> AtmState {
        self.oracle.borrow().state().clone()
    }

    pub fn real(&self) -> RealAtm {
        self.real.borrow().clone()
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    /// Direct access to the mirrored interface.
    pub fn proxy(&mut self) -> &mut Proxy<dyn Atm> {
        &mut self.proxy
    }

    /// Runs lifecycle setup on both implementations.
    ///
    /// Lifecycle hooks are not part of the capability set, so they are called
    /// on each implementation directly rather than through the proxy.
    pub fn init(&mut self) {
        self.proxy.init();
        self.oracle.borrow_mut().init();
        self.real.borrow_mut().init();
    }

    pub fn teardown(&mut self) {
        self.proxy.teardown();
        self.oracle.borrow_mut().teardown();
        self.real.borrow_mut().teardown();
    }

    /// Issues `intent` if the oracle enables it.
    ///
    /// Returns `Ok(false)` when the intent was skipped: its operation is not
    /// enabled, or a wrong-PIN guess happens to match the card's PIN.
    pub fn apply(&mut self, intent: &Intent) -> Result<bool, AtmError> {
        let state = self.oracle_state();
        if !self.oracle.borrow().is_enabled(intent.operation()) {
            return Ok(false);
        }

        match intent {
            Intent::InsertCard(card) => self.proxy.insert_card(card.clone())?,
            Intent::EnterPin { correct, guess } => {
                let card = match &state {
                    AtmState::EnterPin { card, .. } => card,
                    _ => return Ok(false),
                };
                let pin = if *correct {
                    card.pin.clone()
                } else if *guess == card.pin {
                    return Ok(false);
                } else {
                    guess.clone()
                };
                self.proxy.enter_pin(pin)?
            }
            Intent::Cancel => self.proxy.cancel()?,
            Intent::ReturnCard => self.proxy.return_card()?,
            Intent::ChooseMenuItem(item) => self.proxy.choose_menu_item(*item)?,
            Intent::ChooseWithdrawAmount(amount) => self.proxy.choose_withdraw_amount(*amount)?,
        }
        Ok(true)
    }
}

/// Driver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Master seed
    pub seed: u64,

    /// Intents drawn per run
    pub steps: usize,

    /// Distinct cards in circulation
    pub cards: usize,

    /// Wrong PIN limit of the real ATM under test
    pub pin_limit: u32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            steps: 200,
            cards: 3,
            pin_limit: MAX_PIN_TRIES,
        }
    }
}

impl DriverConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_cards(mut self, cards: usize) -> Self {
        self.cards = cards;
        self
    }

    pub fn with_pin_limit(mut self, limit: u32) -> Self {
        self.pin_limit = limit;
        self
    }
}

/// Outcome of a seeded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: u64,

    /// Intents drawn
    pub steps: usize,

    /// Intents that became calls
    pub applied: usize,

    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,

    /// Oracle state when the run ended
    pub final_state: AtmState,

    pub calls: Vec<Call>,
}

impl RunReport {
    /// Renders the call log, one `name(args)` per line.
    pub fn rendered_calls(&self) -> Vec<String> {
        self.calls.iter().map(|c| c.to_string()).collect()
    }
}

/// Runs one seeded differential session.
pub fn run_seeded(config: &DriverConfig) -> Result<RunReport, AtmError> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let cards: Vec<Card> = (0..config.cards).map(|_| random_card(&mut rng)).collect();

    let mut harness = AtmHarness::new(RealAtm::with_pin_limit(config.pin_limit))?;
    harness.init();

    let mut applied = 0;
    let mut steps = 0;
    let mut failure = None;

    while steps < config.steps {
        let intent = Intent::random(&mut rng, &cards);
        steps += 1;
        match harness.apply(&intent) {
            Ok(true) => applied += 1,
            Ok(false) => {}
            Err(e) => {
                warn!("seed={} step={} {:?} failed: {}", config.seed, steps, intent, e);
                failure = Some(e.to_string());
                break;
            }
        }
    }

    harness.teardown();
    let passed = failure.is_none();
    if passed {
        info!("seed={} passed: {} call(s)", config.seed, applied);
    }

    Ok(RunReport {
        seed: config.seed,
        steps,
        applied,
        passed,
        failure,
        final_state: harness.oracle_state(),
        calls: harness.log().snapshot(),
    })
}

/// Replays `calls` against a fresh oracle and real ATM.
///
/// Returns the harness so the caller can inspect the final states; the
/// first implementation error is returned as is.
pub fn replay_calls(calls: &[Call], pin_limit: u32) -> Result<AtmHarness, AtmError> {
    let mut harness = AtmHarness::new(RealAtm::with_pin_limit(pin_limit))?;
    harness.init();
    let target: &mut dyn Atm = harness.proxy();
    let applied = replay(calls, target)?;
    debug!("replayed {} call(s)", applied);
    Ok(harness)
}
