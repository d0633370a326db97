//! Constant Catalog
//!
//! Stable names for terminal-native numeric codes. Callers only ever see
//! the names; a terminal upgrade that renumbers its constants is absorbed
//! here and nowhere else.
//!
//! # Categories
//!
//! | Snapshot key | Type |
//! |--------------|------|
//! | `TIMEFRAMES` | [`Timeframe`] |
//! | `ORDER_TYPES` | [`OrderType`] |
//! | `TRADE_ACTIONS` | [`TradeAction`] |
//! | `ORDER_TIME` | [`OrderTime`] |
//! | `ORDER_FILLING` | [`OrderFilling`] |
//!
//! Every variant must be given a name and a code in its `define_category!`
//! invocation, so an incomplete table does not compile.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::Serialize;

/// Terminal-native numeric code.
pub type NativeCode = i64;

/// Error returned when a name or code is not part of a category.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Name not present in the category.
    #[error("unknown {category} name: {name}")]
    UnknownName {
        /// Category searched.
        category: &'static str,
        /// Offending name.
        name: String,
    },
    /// Native code not present in the category.
    #[error("unknown {category} code: {code}")]
    UnknownCode {
        /// Category searched.
        category: &'static str,
        /// Offending code.
        code: NativeCode,
    },
}

macro_rules! define_category {
    (
        $(#[$meta:meta])*
        $name:ident, $category:literal {
            $($(#[$vmeta:meta])* $variant:ident = $label:literal => $code:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Snapshot key of this category.
            pub const CATEGORY: &'static str = $category;

            /// Every entry of this category.
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Stable name.
            #[must_use]
            pub const fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            /// Terminal-native code.
            #[must_use]
            pub const fn native_code(&self) -> NativeCode {
                match self {
                    $(Self::$variant => $code),+
                }
            }

            /// Resolve a native code back to its entry.
            ///
            /// # Errors
            ///
            /// Returns [`CatalogError::UnknownCode`] if no entry carries `code`.
            pub fn from_native_code(code: NativeCode) -> Result<Self, CatalogError> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|entry| entry.native_code() == code)
                    .ok_or(CatalogError::UnknownCode {
                        category: Self::CATEGORY,
                        code,
                    })
            }

            /// Name to native code table of this category.
            #[must_use]
            pub fn table() -> BTreeMap<&'static str, NativeCode> {
                Self::ALL
                    .iter()
                    .map(|entry| (entry.name(), entry.native_code()))
                    .collect()
            }
        }

        impl FromStr for $name {
            type Err = CatalogError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|entry| entry.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| CatalogError::UnknownName {
                        category: Self::CATEGORY,
                        name: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_category!(
    /// Chart timeframe for rate queries.
    Timeframe, "TIMEFRAMES" {
        /// One minute.
        M1 = "M1" => 1,
        /// Five minutes.
        M5 = "M5" => 5,
        /// Fifteen minutes.
        M15 = "M15" => 15,
        /// Thirty minutes.
        M30 = "M30" => 30,
        /// One hour.
        H1 = "H1" => 0x4000 | 1,
        /// Four hours.
        H4 = "H4" => 0x4000 | 4,
        /// One day.
        D1 = "D1" => 0x4000 | 24,
        /// One week.
        W1 = "W1" => 0x8000 | 1,
    }
);

define_category!(
    /// Order type.
    OrderType, "ORDER_TYPES" {
        /// Market buy.
        Buy = "BUY" => 0,
        /// Market sell.
        Sell = "SELL" => 1,
        /// Buy limit.
        BuyLimit = "BUY_LIMIT" => 2,
        /// Sell limit.
        SellLimit = "SELL_LIMIT" => 3,
        /// Buy stop.
        BuyStop = "BUY_STOP" => 4,
        /// Sell stop.
        SellStop = "SELL_STOP" => 5,
        /// Buy stop limit.
        BuyStopLimit = "BUY_STOP_LIMIT" => 6,
        /// Sell stop limit.
        SellStopLimit = "SELL_STOP_LIMIT" => 7,
    }
);

define_category!(
    /// Trade request action.
    ///
    /// `DONE` is the successful completion code rather than an action; clients
    /// have always found it under this key to compare order results against.
    TradeAction, "TRADE_ACTIONS" {
        /// Immediate execution.
        Deal = "DEAL" => 1,
        /// Place a pending order.
        Pending = "PENDING" => 5,
        /// Modify stop loss / take profit of a position.
        Sltp = "SLTP" => 6,
        /// Modify a pending order.
        Modify = "MODIFY" => 7,
        /// Remove a pending order.
        Remove = "REMOVE" => 8,
        /// Close a position by an opposite one.
        CloseBy = "CLOSE_BY" => 10,
        /// Request completed.
        Done = "DONE" => TradeRetcode::Done.native_code(),
    }
);

define_category!(
    /// Order lifetime policy.
    OrderTime, "ORDER_TIME" {
        /// Good till cancelled.
        Gtc = "GTC" => 0,
        /// Good for the current trading day.
        Day = "DAY" => 1,
        /// Good till the specified time.
        Specified = "SPECIFIED" => 2,
        /// Good till 23:59:59 of the specified day.
        SpecifiedDay = "SPECIFIED_DAY" => 3,
    }
);

define_category!(
    /// Order filling policy.
    OrderFilling, "ORDER_FILLING" {
        /// Fill or kill.
        Fok = "FOK" => 0,
        /// Immediate or cancel.
        Ioc = "IOC" => 1,
        /// Return the unfilled remainder.
        Return = "RETURN" => 2,
    }
);

define_category!(
    /// Completion codes of a trade request.
    TradeRetcode, "TRADE_RETCODES" {
        /// Requote.
        Requote = "REQUOTE" => 10004,
        /// Request rejected.
        Reject = "REJECT" => 10006,
        /// Order placed.
        Placed = "PLACED" => 10008,
        /// Request completed.
        Done = "DONE" => 10009,
        /// Only part of the request was completed.
        DonePartial = "DONE_PARTIAL" => 10010,
        /// No quotes to process the request.
        PriceOff = "PRICE_OFF" => 10021,
    }
);

impl TradeRetcode {
    /// Whether a raw completion code reports a successful submission.
    #[must_use]
    pub fn is_success_code(code: NativeCode) -> bool {
        [Self::Placed, Self::Done, Self::DonePartial]
            .iter()
            .any(|success| success.native_code() == code)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Full catalog as returned to remote callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogSnapshot {
    /// Timeframes.
    #[serde(rename = "TIMEFRAMES")]
    pub timeframes: BTreeMap<&'static str, NativeCode>,
    /// Order types.
    #[serde(rename = "ORDER_TYPES")]
    pub order_types: BTreeMap<&'static str, NativeCode>,
    /// Trade actions.
    #[serde(rename = "TRADE_ACTIONS")]
    pub trade_actions: BTreeMap<&'static str, NativeCode>,
    /// Order lifetime policies.
    #[serde(rename = "ORDER_TIME")]
    pub order_time: BTreeMap<&'static str, NativeCode>,
    /// Order filling policies.
    #[serde(rename = "ORDER_FILLING")]
    pub order_filling: BTreeMap<&'static str, NativeCode>,
}

static SNAPSHOT: LazyLock<CatalogSnapshot> = LazyLock::new(|| CatalogSnapshot {
    timeframes: Timeframe::table(),
    order_types: OrderType::table(),
    trade_actions: TradeAction::table(),
    order_time: OrderTime::table(),
    order_filling: OrderFilling::table(),
});

/// Stateless access to the catalog.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstantCatalog;

impl ConstantCatalog {
    /// The process-wide snapshot, built on first use and never mutated.
    #[must_use]
    pub fn snapshot() -> &'static CatalogSnapshot {
        &SNAPSHOT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("M1", Timeframe::M1 ; "minute")]
    #[test_case("h4", Timeframe::H4 ; "lowercase")]
    #[test_case("W1", Timeframe::W1 ; "week")]
    fn timeframe_from_name(name: &str, expected: Timeframe) {
        assert_eq!(name.parse::<Timeframe>().unwrap(), expected);
    }

    #[test_case(Timeframe::H1, 16385)]
    #[test_case(Timeframe::H4, 16388)]
    #[test_case(Timeframe::D1, 16408)]
    #[test_case(Timeframe::W1, 32769)]
    fn timeframe_native_codes(timeframe: Timeframe, code: NativeCode) {
        assert_eq!(timeframe.native_code(), code);
        assert_eq!(Timeframe::from_native_code(code).unwrap(), timeframe);
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "M2".parse::<Timeframe>().unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnknownName {
                category: "TIMEFRAMES",
                name: "M2".to_string()
            }
        );
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert!(OrderFilling::from_native_code(99).is_err());
    }

    #[test]
    fn every_name_resolves_in_every_category() {
        let snapshot = ConstantCatalog::snapshot();
        assert_eq!(snapshot.timeframes.len(), Timeframe::ALL.len());
        assert_eq!(snapshot.order_types.len(), OrderType::ALL.len());
        assert_eq!(snapshot.trade_actions.len(), TradeAction::ALL.len());
        assert_eq!(snapshot.order_time.len(), OrderTime::ALL.len());
        assert_eq!(snapshot.order_filling.len(), OrderFilling::ALL.len());

        for entry in Timeframe::ALL {
            assert_eq!(snapshot.timeframes[entry.name()], entry.native_code());
        }
        for entry in OrderType::ALL {
            assert_eq!(snapshot.order_types[entry.name()], entry.native_code());
        }
        for entry in TradeAction::ALL {
            assert_eq!(snapshot.trade_actions[entry.name()], entry.native_code());
        }
        for entry in OrderTime::ALL {
            assert_eq!(snapshot.order_time[entry.name()], entry.native_code());
        }
        for entry in OrderFilling::ALL {
            assert_eq!(snapshot.order_filling[entry.name()], entry.native_code());
        }
    }

    #[test]
    fn snapshot_is_memoized() {
        let first = ConstantCatalog::snapshot();
        let second = ConstantCatalog::snapshot();
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn snapshot_wire_keys() {
        let value = serde_json::to_value(ConstantCatalog::snapshot()).unwrap();
        assert_eq!(value["TIMEFRAMES"]["M1"], 1);
        assert_eq!(value["ORDER_TYPES"]["SELL_STOP_LIMIT"], 7);
        assert_eq!(value["TRADE_ACTIONS"]["DONE"], 10009);
        assert_eq!(value["ORDER_TIME"]["SPECIFIED"], 2);
        assert_eq!(value["ORDER_FILLING"]["FOK"], 0);
    }

    #[test_case(10008, true ; "placed")]
    #[test_case(10009, true ; "done")]
    #[test_case(10010, true ; "done partial")]
    #[test_case(10004, false ; "requote")]
    #[test_case(10006, false ; "reject")]
    fn retcode_success(code: NativeCode, success: bool) {
        assert_eq!(TradeRetcode::is_success_code(code), success);
    }
}
