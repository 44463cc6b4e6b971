//! Static catalog: indicators by id with dynamic parameters.
//!
//! Each listing exposes the three execution shapes as plain function
//! pointers. All three build the formula from the same `Params` and run the
//! same step, so for identical input they return identical points.

use std::collections::BTreeMap;

use barflow_core::{
    BufferList, CandlePart, ChainProvider, Formula, Hub, Ohlcv, QuoteProvider, Reusable,
    StreamError, StreamItem, StreamResult, Timestamp,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Atr, Ema, QuotePart, Rsi, Sma, Tr};

// ── Parameters ───────────────────────────────────────────────────────

/// A dynamically supplied parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Non-negative whole number. Floats must have no fractional part;
    /// text must parse as an integer.
    pub fn as_usize(&self, name: &str) -> StreamResult<usize> {
        let invalid = || {
            StreamError::InvalidArgument(format!(
                "parameter '{name}' must be a non-negative integer, got {self:?}"
            ))
        };
        match self {
            ParamValue::Int(v) => usize::try_from(*v).map_err(|_| invalid()),
            ParamValue::Float(v) if v.fract() == 0.0 && *v >= 0.0 => Ok(*v as usize),
            ParamValue::Text(s) => s.trim().parse().map_err(|_| invalid()),
            _ => Err(invalid()),
        }
    }

    pub fn as_f64(&self, name: &str) -> StreamResult<f64> {
        match self {
            ParamValue::Int(v) => Ok(*v as f64),
            ParamValue::Float(v) => Ok(*v),
            ParamValue::Text(s) => s.trim().parse().map_err(|_| {
                StreamError::InvalidArgument(format!("parameter '{name}' must be a number"))
            }),
            ParamValue::Bool(_) => Err(StreamError::InvalidArgument(format!(
                "parameter '{name}' must be a number"
            ))),
        }
    }

    pub fn as_candle_part(&self, name: &str) -> StreamResult<CandlePart> {
        match self {
            ParamValue::Text(s) => CandlePart::from_name(s).ok_or_else(|| {
                StreamError::InvalidArgument(format!("parameter '{name}': unknown candle part '{s}'"))
            }),
            _ => Err(StreamError::InvalidArgument(format!(
                "parameter '{name}' must be a candle part name"
            ))),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Text(v.to_string())
    }
}

/// Named parameter values, e.g. parsed from JSON `{"lookback_periods": 14}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn usize_or(&self, name: &str, default: usize) -> StreamResult<usize> {
        self.get(name).map_or(Ok(default), |v| v.as_usize(name))
    }

    pub fn candle_part_or(&self, name: &str, default: CandlePart) -> StreamResult<CandlePart> {
        self.get(name)
            .map_or(Ok(default), |v| v.as_candle_part(name))
    }

    /// Reject names the listing does not declare.
    fn check_known(&self, id: &str, specs: &[ParamSpec]) -> StreamResult<()> {
        match self.0.keys().find(|k| !specs.iter().any(|s| s.name == k.as_str())) {
            Some(unknown) => Err(StreamError::InvalidArgument(format!(
                "{id} has no parameter '{unknown}'"
            ))),
            None => Ok(()),
        }
    }
}

// ── Listing metadata ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    MovingAverage,
    Oscillator,
    PriceCharacteristic,
    PriceTransform,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Int(usize),
    Candle(CandlePart),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    pub default: ParamDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultSpec {
    pub data_name: &'static str,
    pub display_name: &'static str,
    /// The field forwarded to chained indicators.
    pub reusable: bool,
}

/// One result position in erased form: the timestamp and the reusable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub timestamp: Timestamp,
    pub value: Option<f64>,
}

fn points<R: Reusable>(results: &[R]) -> Vec<Point> {
    results
        .iter()
        .map(|r| Point {
            timestamp: r.timestamp(),
            value: barflow_core::domain::series::finite(r.value()),
        })
        .collect()
}

/// A buffer behind the catalog's uniform shape.
pub trait ErasedBuffer<Q>: Send {
    fn add(&mut self, quote: Q) -> StreamResult<()>;
    fn points(&self) -> Vec<Point>;
    fn label(&self) -> String;
}

impl<Q, F> ErasedBuffer<Q> for BufferList<Q, F>
where
    Q: StreamItem,
    F: Formula<Q>,
    F::Output: Reusable,
{
    fn add(&mut self, quote: Q) -> StreamResult<()> {
        BufferList::add(self, quote)
    }

    fn points(&self) -> Vec<Point> {
        points(&self.results())
    }

    fn label(&self) -> String {
        BufferList::label(self)
    }
}

/// A subscribed hub behind the catalog's uniform shape.
pub trait ErasedHub: Send + Sync {
    fn points(&self) -> Vec<Point>;
    fn label(&self) -> String;
    fn unsubscribe(&self);
}

impl<Q, F> ErasedHub for Hub<Q, F>
where
    Q: StreamItem,
    F: Formula<Q>,
    F::Output: Reusable,
{
    fn points(&self) -> Vec<Point> {
        self.read(points)
    }

    fn label(&self) -> String {
        Hub::label(self)
    }

    fn unsubscribe(&self) {
        Hub::unsubscribe(self)
    }
}

/// Catalog entry for one indicator over quotes of type `Q`.
pub struct Listing<Q> {
    pub id: &'static str,
    pub name: &'static str,
    pub category: Category,
    pub params: &'static [ParamSpec],
    pub results: &'static [ResultSpec],
    pub batch: fn(&[Q], &Params) -> StreamResult<Vec<Point>>,
    pub buffer: fn(&Params) -> StreamResult<Box<dyn ErasedBuffer<Q>>>,
    pub stream: fn(&QuoteProvider<Q>, &Params) -> StreamResult<Box<dyn ErasedHub>>,
}

impl<Q> std::fmt::Debug for Listing<Q> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listing")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("category", &self.category)
            .finish()
    }
}

// ── Construction from parameters ─────────────────────────────────────

/// Formulas the catalog can build from dynamic parameters.
pub trait FromParams: Sized {
    const ID: &'static str;
    fn from_params(params: &Params) -> StreamResult<Self>;
}

const LOOKBACK: &str = "lookback_periods";

impl FromParams for Sma {
    const ID: &'static str = "SMA";
    fn from_params(params: &Params) -> StreamResult<Self> {
        Sma::new(params.usize_or(LOOKBACK, 20)?)
    }
}

impl FromParams for Ema {
    const ID: &'static str = "EMA";
    fn from_params(params: &Params) -> StreamResult<Self> {
        Ema::new(params.usize_or(LOOKBACK, 20)?)
    }
}

impl FromParams for Atr {
    const ID: &'static str = "ATR";
    fn from_params(params: &Params) -> StreamResult<Self> {
        Atr::new(params.usize_or(LOOKBACK, 14)?)
    }
}

impl FromParams for Rsi {
    const ID: &'static str = "RSI";
    fn from_params(params: &Params) -> StreamResult<Self> {
        Rsi::new(params.usize_or(LOOKBACK, 14)?)
    }
}

impl FromParams for Tr {
    const ID: &'static str = "TR";
    fn from_params(_: &Params) -> StreamResult<Self> {
        Ok(Tr::new())
    }
}

impl FromParams for QuotePart {
    const ID: &'static str = "QUOTEPART";
    fn from_params(params: &Params) -> StreamResult<Self> {
        Ok(QuotePart::new(
            params.candle_part_or("candle_part", CandlePart::Close)?,
        ))
    }
}

fn build<F: FromParams>(params: &Params) -> StreamResult<F> {
    let specs = find_specs(F::ID);
    params.check_known(F::ID, specs)?;
    let formula = F::from_params(params)?;
    debug!(id = F::ID, ?params, "catalog built formula");
    Ok(formula)
}

fn batch<Q, F>(quotes: &[Q], params: &Params) -> StreamResult<Vec<Point>>
where
    Q: StreamItem,
    F: Formula<Q> + FromParams,
    F::Output: Reusable,
{
    let formula: F = build(params)?;
    Ok(points(&formula.compute_all(quotes)))
}

fn buffer<Q, F>(params: &Params) -> StreamResult<Box<dyn ErasedBuffer<Q>>>
where
    Q: StreamItem,
    F: Formula<Q> + FromParams,
    F::Output: Reusable,
{
    let formula: F = build(params)?;
    Ok(Box::new(BufferList::new(formula)))
}

fn stream<Q, F>(provider: &QuoteProvider<Q>, params: &Params) -> StreamResult<Box<dyn ErasedHub>>
where
    Q: StreamItem,
    F: Formula<Q> + FromParams,
    F::Output: Reusable,
{
    let formula: F = build(params)?;
    Ok(Box::new(provider.attach(formula)?))
}

// ── Table ────────────────────────────────────────────────────────────

const LOOKBACK_14: &[ParamSpec] = &[ParamSpec {
    name: LOOKBACK,
    display_name: "Lookback Periods",
    default: ParamDefault::Int(14),
}];

const LOOKBACK_20: &[ParamSpec] = &[ParamSpec {
    name: LOOKBACK,
    display_name: "Lookback Periods",
    default: ParamDefault::Int(20),
}];

const CANDLE: &[ParamSpec] = &[ParamSpec {
    name: "candle_part",
    display_name: "Candle Part",
    default: ParamDefault::Candle(CandlePart::Close),
}];

fn find_specs(id: &str) -> &'static [ParamSpec] {
    match id {
        "SMA" | "EMA" => LOOKBACK_20,
        "ATR" | "RSI" => LOOKBACK_14,
        "QUOTEPART" => CANDLE,
        _ => &[],
    }
}

fn listing<Q, F>(
    name: &'static str,
    category: Category,
    results: &'static [ResultSpec],
) -> Listing<Q>
where
    Q: StreamItem,
    F: Formula<Q> + FromParams,
    F::Output: Reusable,
{
    Listing {
        id: F::ID,
        name,
        category,
        params: find_specs(F::ID),
        results,
        batch: batch::<Q, F>,
        buffer: buffer::<Q, F>,
        stream: stream::<Q, F>,
    }
}

/// Every listed indicator, for quotes that carry OHLCV and a close value.
pub fn listings<Q: Ohlcv + Reusable + StreamItem>() -> Vec<Listing<Q>> {
    vec![
        listing::<Q, Sma>(
            "Simple Moving Average (SMA)",
            Category::MovingAverage,
            &[ResultSpec {
                data_name: "sma",
                display_name: "SMA",
                reusable: true,
            }],
        ),
        listing::<Q, Ema>(
            "Exponential Moving Average (EMA)",
            Category::MovingAverage,
            &[ResultSpec {
                data_name: "ema",
                display_name: "EMA",
                reusable: true,
            }],
        ),
        listing::<Q, Tr>(
            "True Range (TR)",
            Category::PriceCharacteristic,
            &[ResultSpec {
                data_name: "tr",
                display_name: "True Range",
                reusable: true,
            }],
        ),
        listing::<Q, Atr>(
            "Average True Range (ATR)",
            Category::PriceCharacteristic,
            &[
                ResultSpec {
                    data_name: "tr",
                    display_name: "True Range",
                    reusable: false,
                },
                ResultSpec {
                    data_name: "atr",
                    display_name: "ATR",
                    reusable: false,
                },
                ResultSpec {
                    data_name: "atrp",
                    display_name: "ATR %",
                    reusable: true,
                },
            ],
        ),
        listing::<Q, Rsi>(
            "Relative Strength Index (RSI)",
            Category::Oscillator,
            &[ResultSpec {
                data_name: "rsi",
                display_name: "RSI",
                reusable: true,
            }],
        ),
        listing::<Q, QuotePart>(
            "Quote Part",
            Category::PriceTransform,
            &[ResultSpec {
                data_name: "value",
                display_name: "Value",
                reusable: true,
            }],
        ),
    ]
}

/// Look up a listing by id, ignoring case.
pub fn find<Q: Ohlcv + Reusable + StreamItem>(id: &str) -> StreamResult<Listing<Q>> {
    listings::<Q>()
        .into_iter()
        .find(|l| l.id.eq_ignore_ascii_case(id))
        .ok_or_else(|| StreamError::InvalidArgument(format!("unknown indicator id '{id}'")))
}
