//! Simulated Terminal
//!
//! In-memory terminal with a fixed demo account and a handful of symbols.
//! Behaves like the real terminal where the gateway can observe it: null
//! results with a recorded last error, login only after initialize, data
//! calls only while connected.
//!
//! Failure modes can be scripted, and the terminal counts native initialize
//! calls and the highest number of native calls it saw in flight at once.
//! Positions and deals live only as long as one session.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::application::ports::{NativeError, Payload, PositionsQuery, TerminalPort};
use crate::domain::catalog::{NativeCode, Timeframe, TradeRetcode};
use crate::domain::session::Credential;

/// Epoch seconds of the most recent simulated bar.
const LATEST_BAR_TIME: i64 = 1_700_000_000;

/// Symbols the simulated terminal knows, with their last price and digits.
const SYMBOLS: &[(&str, f64, u32)] = &[
    ("EURUSD", 1.0850, 5),
    ("GBPUSD", 1.2650, 5),
    ("USDJPY", 149.50, 3),
    ("XAUUSD", 1985.40, 2),
];

/// Scripted outcome of `order_send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderScript {
    /// Fill the order with `DONE`.
    #[default]
    Fill,
    /// Return null.
    Null,
    /// Return a result with the given completion code.
    Retcode(NativeCode),
}

#[derive(Debug)]
struct State {
    connected: bool,
    account: Option<u64>,
    last_error: NativeError,
    init_failures: u32,
    reject_credentials: bool,
    rates_available: bool,
    order_script: OrderScript,
    next_ticket: u64,
    positions: Vec<Payload>,
    deals: Vec<Payload>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            connected: false,
            account: None,
            last_error: NativeError::success(),
            init_failures: 0,
            reject_credentials: false,
            rates_available: true,
            order_script: OrderScript::Fill,
            next_ticket: 100_000,
            positions: Vec::new(),
            deals: Vec::new(),
        }
    }
}

impl State {
    fn fail<T>(&mut self, native: NativeError) -> Option<T> {
        self.last_error = native;
        None
    }

    fn succeed<T>(&mut self, value: T) -> Option<T> {
        self.last_error = NativeError::success();
        Some(value)
    }

    fn require_connection(&mut self) -> Result<(), NativeError> {
        if self.connected {
            Ok(())
        } else {
            let native = NativeError::connect_fail("IPC No connection");
            self.last_error = native.clone();
            Err(native)
        }
    }
}

/// In-memory [`TerminalPort`].
#[derive(Debug, Default)]
pub struct SimulatedTerminal {
    state: Mutex<State>,
    call_delay: Mutex<Duration>,
    initialize_calls: AtomicU32,
    shutdown_calls: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Marks a native call as in flight until dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedTerminal {
    /// Account accepted by `login`.
    pub const DEMO_ACCOUNT: u64 = 5_550_001;
    /// Password accepted by `login`.
    pub const DEMO_PASSWORD: &'static str = "demo-password";
    /// Server accepted by `login`.
    pub const DEMO_SERVER: &'static str = "Simulated-Demo";

    /// Create a disconnected terminal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` initialize calls.
    pub fn fail_initialize(&self, times: u32) {
        self.state.lock().init_failures = times;
    }

    /// Reject every login, including the demo credential.
    pub fn reject_credentials(&self, reject: bool) {
        self.state.lock().reject_credentials = reject;
    }

    /// Make rate queries return null.
    pub fn set_rates_available(&self, available: bool) {
        self.state.lock().rates_available = available;
    }

    /// Script the outcome of `order_send`.
    pub fn set_order_script(&self, script: OrderScript) {
        self.state.lock().order_script = script;
    }

    /// Hold every native call for `delay`.
    pub fn set_call_delay(&self, delay: Duration) {
        *self.call_delay.lock() = delay;
    }

    /// Native initialize calls so far, failed ones included.
    #[must_use]
    pub fn initialize_calls(&self) -> u32 {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    /// Native shutdown calls so far.
    #[must_use]
    pub fn shutdown_calls(&self) -> u32 {
        self.shutdown_calls.load(Ordering::SeqCst)
    }

    /// Highest number of native calls observed in flight at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Whether the terminal connection is up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let call = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.call_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        call
    }

    fn bars(symbol: &str, timeframe: Timeframe, start_pos: u32, count: u32) -> Vec<Payload> {
        let price = quote(symbol).map_or(1.0, |(_, price, _)| price);
        let period = period_secs(timeframe);

        (0..count)
            .map(|i| {
                let offset = i64::from(start_pos) + i64::from(count - 1 - i);
                let drift = f64::from(i) * 0.0001;
                json!({
                    "time": LATEST_BAR_TIME - offset * period,
                    "open": price + drift,
                    "high": price + drift + 0.0005,
                    "low": price + drift - 0.0005,
                    "close": price + drift + 0.0002,
                    "tick_volume": 100 + i64::from(i),
                    "spread": 10,
                    "real_volume": 0,
                })
            })
            .collect()
    }
}

fn quote(symbol: &str) -> Option<(&'static str, f64, u32)> {
    SYMBOLS.iter().copied().find(|(name, _, _)| *name == symbol)
}

const fn period_secs(timeframe: Timeframe) -> i64 {
    let minutes = match timeframe {
        Timeframe::M1 => 1,
        Timeframe::M5 => 5,
        Timeframe::M15 => 15,
        Timeframe::M30 => 30,
        Timeframe::H1 => 60,
        Timeframe::H4 => 240,
        Timeframe::D1 => 1_440,
        Timeframe::W1 => 10_080,
    };
    minutes * 60
}

#[async_trait]
impl TerminalPort for SimulatedTerminal {
    async fn initialize(&self) -> Result<(), NativeError> {
        let _call = self.enter().await;
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        if state.init_failures > 0 {
            state.init_failures -= 1;
            let native = NativeError::init_fail("IPC initialize failed, terminal not found");
            state.last_error = native.clone();
            return Err(native);
        }
        state.connected = true;
        state.last_error = NativeError::success();
        Ok(())
    }

    async fn login(&self, credential: &Credential) -> Result<(), NativeError> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection()?;

        let accepted = !state.reject_credentials
            && credential.account() == Self::DEMO_ACCOUNT
            && credential.password() == Self::DEMO_PASSWORD
            && credential.server() == Self::DEMO_SERVER;
        if !accepted {
            state.account = None;
            let native = NativeError::auth_failed("Authorization failed");
            state.last_error = native.clone();
            return Err(native);
        }

        state.account = Some(credential.account());
        state.last_error = NativeError::success();
        Ok(())
    }

    async fn shutdown(&self) {
        let _call = self.enter().await;
        self.shutdown_calls.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.connected = false;
        state.account = None;
        state.positions.clear();
        state.deals.clear();
    }

    async fn last_error(&self) -> NativeError {
        self.state.lock().last_error.clone()
    }

    async fn account_info(&self) -> Option<Payload> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        let Some(login) = state.account else {
            return state.fail(NativeError::auth_failed("Not logged in"));
        };
        state.succeed(json!({
            "login": login,
            "server": Self::DEMO_SERVER,
            "name": "Simulated Account",
            "currency": "USD",
            "leverage": 100,
            "balance": 10_000.0,
            "equity": 10_000.0,
            "margin_free": 10_000.0,
        }))
    }

    async fn copy_rates_from_pos(
        &self,
        symbol: &str,
        timeframe: NativeCode,
        start_pos: u32,
        count: u32,
    ) -> Option<Vec<Payload>> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        let Ok(timeframe) = Timeframe::from_native_code(timeframe) else {
            return state.fail(NativeError::invalid_params("Invalid \"timeframe\" argument"));
        };
        if quote(symbol).is_none() {
            return state.fail(NativeError::invalid_params("Invalid \"symbol\" argument"));
        }
        if !state.rates_available {
            return state.fail(NativeError::generic_fail("Terminal: Call failed"));
        }
        state.succeed(Self::bars(symbol, timeframe, start_pos, count))
    }

    async fn order_send(&self, request: &Payload) -> Option<Payload> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        if state.account.is_none() {
            return state.fail(NativeError::auth_failed("Not logged in"));
        }

        let script = state.order_script;
        match script {
            OrderScript::Null => {
                state.fail(NativeError::invalid_params("Invalid \"request\" argument"))
            }
            OrderScript::Retcode(code) if !TradeRetcode::is_success_code(code) => {
                state.succeed(json!({
                    "retcode": code,
                    "comment": "Request rejected",
                    "order": 0,
                    "deal": 0,
                    "request": request,
                }))
            }
            OrderScript::Fill | OrderScript::Retcode(_) => {
                let code = match script {
                    OrderScript::Retcode(code) => code,
                    _ => TradeRetcode::Done.native_code(),
                };
                let ticket = state.next_ticket;
                state.next_ticket += 1;

                let symbol = request.get("symbol").cloned().unwrap_or(Value::Null);
                let volume = request.get("volume").cloned().unwrap_or(Value::Null);
                state.positions.push(json!({
                    "ticket": ticket,
                    "symbol": symbol,
                    "volume": volume,
                    "type": request.get("type").cloned().unwrap_or(json!(0)),
                }));
                state.deals.push(json!({
                    "ticket": ticket,
                    "order": ticket,
                    "symbol": symbol,
                    "volume": volume,
                }));

                state.succeed(json!({
                    "retcode": code,
                    "comment": "Request executed",
                    "order": ticket,
                    "deal": ticket,
                    "volume": volume,
                    "request": request,
                }))
            }
        }
    }

    async fn positions_get(&self, query: &PositionsQuery) -> Option<Vec<Payload>> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        let positions = state
            .positions
            .iter()
            .filter(|p| {
                query
                    .symbol
                    .as_deref()
                    .is_none_or(|symbol| p["symbol"] == symbol)
            })
            .filter(|p| query.ticket.is_none_or(|ticket| p["ticket"] == ticket))
            .cloned()
            .collect();
        state.succeed(positions)
    }

    async fn symbol_info(&self, symbol: &str) -> Option<Payload> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        let Some((name, price, digits)) = quote(symbol) else {
            return state.fail(NativeError::invalid_params("Invalid \"symbol\" argument"));
        };
        state.succeed(json!({
            "name": name,
            "digits": digits,
            "point": 10f64.powi(-i32::try_from(digits).unwrap_or(5)),
            "bid": price,
            "ask": price,
            "visible": true,
        }))
    }

    async fn symbol_info_tick(&self, symbol: &str) -> Option<Payload> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        let Some((_, price, _)) = quote(symbol) else {
            return state.fail(NativeError::invalid_params("Invalid \"symbol\" argument"));
        };
        state.succeed(json!({
            "time": LATEST_BAR_TIME,
            "bid": price,
            "ask": price + 0.0001,
            "last": 0.0,
            "volume": 0,
        }))
    }

    async fn symbol_select(&self, symbol: &str, _enable: bool) -> bool {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        if state.require_connection().is_err() {
            return false;
        }
        if quote(symbol).is_none() {
            state.last_error = NativeError::invalid_params("Invalid \"symbol\" argument");
            return false;
        }
        state.last_error = NativeError::success();
        true
    }

    async fn history_deals_get(&self, query: &Payload) -> Option<Vec<Payload>> {
        let _call = self.enter().await;

        let mut state = self.state.lock();
        state.require_connection().ok()?;
        let symbol = query.get("symbol").and_then(Value::as_str);
        let deals = state
            .deals
            .iter()
            .filter(|d| symbol.is_none_or(|symbol| d["symbol"] == symbol))
            .cloned()
            .collect();
        state.succeed(deals)
    }
}
