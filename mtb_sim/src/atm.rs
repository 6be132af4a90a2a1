//! ATM capability set, reference oracle and real implementation.
//!
//! The oracle is a plain state machine: every operation is legal in a fixed
//! set of states and fails with `ActionNotEnabled` elsewhere. The real
//! implementation is written the way device code tends to be, with flags and
//! internal assertions. Driving both through one proxy surfaces any place
//! where they disagree.

use mtb_core::{enum_param, record_param};
use mtb_proxy::{capability_set, Lifecycle, ProxyError};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::debug;

/// Wrong PIN entries allowed before the card is returned.
pub const MAX_PIN_TRIES: u32 = 3;

/// A bank card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub name: String,
    pub pin: String,
}

record_param!(Card { name: String, pin: String });

impl Card {
    pub fn new(name: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pin: pin.into(),
        }
    }
}

/// Main menu entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MenuItem {
    Withdraw,
    Balance,
    Quit,
}

enum_param!(MenuItem { Withdraw, Balance, Quit });

impl MenuItem {
    pub const ALL: [MenuItem; 3] = [MenuItem::Withdraw, MenuItem::Balance, MenuItem::Quit];
}

/// Abstract ATM state tracked by the oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtmState {
    Idle,
    EnterPin { card: Card, pin_tries: u32 },
    Menu,
    Withdraw,
    Balance,
    ReturnCard,
}

impl AtmState {
    pub fn name(&self) -> &'static str {
        match self {
            AtmState::Idle => "Idle",
            AtmState::EnterPin { .. } => "EnterPin",
            AtmState::Menu => "Menu",
            AtmState::Withdraw => "Withdraw",
            AtmState::Balance => "Balance",
            AtmState::ReturnCard => "ReturnCard",
        }
    }
}

impl fmt::Display for AtmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtmState::EnterPin { card, pin_tries } => {
                write!(f, "EnterPin(card={}, pin_tries={})", card.name, pin_tries)
            }
            other => f.write_str(other.name()),
        }
    }
}

/// ATM errors.
#[derive(Debug, Error)]
pub enum AtmError {
    /// Operation called in a state that does not allow it
    #[error("Action {action} is not enabled in state {state}")]
    ActionNotEnabled { action: String, state: String },

    /// Internal consistency check of an implementation failed
    #[error("Invariant violated in {operation}: {condition}")]
    Invariant { operation: String, condition: String },

    /// Call capture, decode or dispatch failed
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

impl AtmError {
    fn not_enabled(action: &str, state: &AtmState) -> Self {
        Self::ActionNotEnabled {
            action: action.to_string(),
            state: state.name().to_string(),
        }
    }

    /// Returns true if an implementation detected the problem itself.
    pub fn is_implementation_fault(&self) -> bool {
        matches!(self, Self::Invariant { .. } | Self::ActionNotEnabled { .. })
    }
}

capability_set! {
    /// Operations accepted by every ATM implementation.
    pub trait Atm {
        type Error = AtmError;

        fn insert_card(&mut self, card: Card);
        fn enter_pin(&mut self, pin: String);
        fn cancel(&mut self);
        fn return_card(&mut self);
        fn choose_menu_item(&mut self, item: MenuItem);
        fn choose_withdraw_amount(&mut self, amount: u64);
    }
}

/// Reference state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtmOracle {
    state: AtmState,
}

impl Default for AtmOracle {
    fn default() -> Self {
        Self {
            state: AtmState::Idle,
        }
    }
}

impl AtmOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &AtmState {
        &self.state
    }

    /// Returns true if `operation` is legal in the current state.
    pub fn is_enabled(&self, operation: &str) -> bool {
        match (operation, &self.state) {
            ("insert_card", AtmState::Idle) => true,
            ("enter_pin", AtmState::EnterPin { .. }) => true,
            ("cancel", AtmState::EnterPin { .. })
            | ("cancel", AtmState::Menu)
            | ("cancel", AtmState::Withdraw)
            | ("cancel", AtmState::Balance) => true,
            ("return_card", AtmState::ReturnCard) => true,
            ("choose_menu_item", AtmState::Menu) => true,
            ("choose_withdraw_amount", AtmState::Withdraw) => true,
            _ => false,
        }
    }

    fn require(&self, operation: &str) -> Result<(), AtmError> {
        if self.is_enabled(operation) {
            Ok(())
        } else {
            Err(AtmError::not_enabled(operation, &self.state))
        }
    }

    fn transition(&mut self, next: AtmState) {
        debug!("oracle {} -> {}", self.state, next);
        self.state = next;
    }
}

impl Atm for AtmOracle {
    fn insert_card(&mut self, card: Card) -> Result<(), AtmError> {
        self.require("insert_card")?;
        self.transition(AtmState::EnterPin { card, pin_tries: 0 });
        Ok(())
    }

    fn enter_pin(&mut self, pin: String) -> Result<(), AtmError> {
        let (card, pin_tries) = match &self.state {
            AtmState::EnterPin { card, pin_tries } => (card.clone(), *pin_tries),
            other => return Err(AtmError::not_enabled("enter_pin", other)),
        };

        let next = if pin == card.pin {
            AtmState::Menu
        } else if pin_tries + 1 >= MAX_PIN_TRIES {
            AtmState::ReturnCard
        } else {
            AtmState::EnterPin {
                card,
                pin_tries: pin_tries + 1,
            }
        };
        self.transition(next);
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), AtmError> {
        self.require("cancel")?;
        self.transition(AtmState::ReturnCard);
        Ok(())
    }

    fn return_card(&mut self) -> Result<(), AtmError> {
        self.require("return_card")?;
        self.transition(AtmState::Idle);
        Ok(())
    }

    fn choose_menu_item(&mut self, item: MenuItem) -> Result<(), AtmError> {
        self.require("choose_menu_item")?;
        self.transition(match item {
            MenuItem::Withdraw => AtmState::Withdraw,
            MenuItem::Balance => AtmState::Balance,
            MenuItem::Quit => AtmState::ReturnCard,
        });
        Ok(())
    }

    fn choose_withdraw_amount(&mut self, _amount: u64) -> Result<(), AtmError> {
        self.require("choose_withdraw_amount")?;
        self.transition(AtmState::ReturnCard);
        Ok(())
    }
}

impl Lifecycle for AtmOracle {
    fn init(&mut self) {
        self.state = AtmState::Idle;
    }
}

/// Flag-based implementation with internal consistency checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealAtm {
    pub card: Option<Card>,
    pub pin_tries: u32,
    pub pin_ok: bool,
    pub canceled: bool,
    pub screen: Option<MenuItem>,
    pub dispensed: u64,

    /// Wrong PIN entries after which the card is kept back
    pin_limit: u32,

    /// Lifecycle bookkeeping
    sessions: u32,
}

impl Default for RealAtm {
    fn default() -> Self {
        Self::with_pin_limit(MAX_PIN_TRIES)
    }
}

impl RealAtm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an ATM that returns the card after `limit` wrong PINs.
    ///
    /// Any limit other than [`MAX_PIN_TRIES`] disagrees with the oracle.
    pub fn with_pin_limit(limit: u32) -> Self {
        Self {
            card: None,
            pin_tries: 0,
            pin_ok: false,
            canceled: false,
            screen: None,
            dispensed: 0,
            pin_limit: limit,
            sessions: 0,
        }
    }

    pub fn pin_limit(&self) -> u32 {
        self.pin_limit
    }

    pub fn sessions(&self) -> u32 {
        self.sessions
    }

    fn ensure(operation: &str, holds: bool, condition: &str) -> Result<(), AtmError> {
        if holds {
            Ok(())
        } else {
            Err(AtmError::Invariant {
                operation: operation.to_string(),
                condition: condition.to_string(),
            })
        }
    }

    fn reset(&mut self) {
        self.card = None;
        self.pin_tries = 0;
        self.pin_ok = false;
        self.canceled = false;
        self.screen = None;
    }
}

impl Atm for RealAtm {
    fn insert_card(&mut self, card: Card) -> Result<(), AtmError> {
        Self::ensure("insert_card", self.card.is_none(), "no card inserted")?;
        Self::ensure("insert_card", self.pin_tries == 0, "pin_tries == 0")?;
        Self::ensure("insert_card", !self.pin_ok, "!pin_ok")?;
        Self::ensure("insert_card", !self.canceled, "!canceled")?;
        self.card = Some(card);
        self.sessions += 1;
        Ok(())
    }

    fn enter_pin(&mut self, pin: String) -> Result<(), AtmError> {
        let correct = match &self.card {
            Some(card) => card.pin == pin,
            None => return Self::ensure("enter_pin", false, "card inserted"),
        };
        Self::ensure("enter_pin", self.pin_tries < self.pin_limit, "pin_tries < limit")?;
        Self::ensure("enter_pin", !self.pin_ok, "!pin_ok")?;
        Self::ensure("enter_pin", !self.canceled, "!canceled")?;

        if correct {
            self.pin_ok = true;
        } else if self.pin_tries + 1 >= self.pin_limit {
            self.canceled = true;
        } else {
            self.pin_tries += 1;
        }
        Ok(())
    }

    fn cancel(&mut self) -> Result<(), AtmError> {
        Self::ensure("cancel", self.card.is_some(), "card inserted")?;
        Self::ensure("cancel", !self.canceled, "!canceled")?;
        self.canceled = true;
        Ok(())
    }

    fn return_card(&mut self) -> Result<(), AtmError> {
        Self::ensure("return_card", self.card.is_some(), "card inserted")?;
        Self::ensure("return_card", self.canceled, "canceled")?;
        self.reset();
        Ok(())
    }

    fn choose_menu_item(&mut self, item: MenuItem) -> Result<(), AtmError> {
        Self::ensure("choose_menu_item", self.card.is_some(), "card inserted")?;
        Self::ensure("choose_menu_item", self.pin_ok, "pin_ok")?;
        Self::ensure("choose_menu_item", !self.canceled, "!canceled")?;
        Self::ensure("choose_menu_item", self.screen.is_none(), "main menu shown")?;
        match item {
            MenuItem::Withdraw | MenuItem::Balance => self.screen = Some(item),
            MenuItem::Quit => self.canceled = true,
        }
        Ok(())
    }

    fn choose_withdraw_amount(&mut self, amount: u64) -> Result<(), AtmError> {
        Self::ensure(
            "choose_withdraw_amount",
            self.screen == Some(MenuItem::Withdraw),
            "withdraw screen shown",
        )?;
        Self::ensure("choose_withdraw_amount", !self.canceled, "!canceled")?;
        self.dispensed += amount;
        self.canceled = true;
        Ok(())
    }
}

impl Lifecycle for RealAtm {
    fn init(&mut self) {
        self.reset();
    }

    fn teardown(&mut self) {
        debug!("RealAtm served {} session(s), dispensed {}", self.sessions, self.dispensed);
    }
}
