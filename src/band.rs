//! Frequency normalization and amateur band lookup.
//!
//! HamAlert spots carry the frequency in whatever shape the upstream source
//! produced: a JSON number in kHz, a number in MHz, or a string such as
//! `"14.062 MHz"`. Everything here reduces those to megahertz and then to a
//! band label like `"20m"`.

use nom::{
    IResult, Parser,
    character::complete::{char, digit1},
    combinator::{map_res, opt, recognize},
};
use serde_json::Value;

/// Band label used when a frequency is outside every known allocation.
pub const UNKNOWN_BAND: &str = "unknown";

/// Values at or above this are taken to be kHz rather than MHz.
const KHZ_THRESHOLD: f64 = 1000.0;

/// Inclusive band edges in MHz, lowest first (US allocations).
const BANDS: &[(f64, f64, &str)] = &[
    (0.1357, 0.1378, "2200m"),
    (0.472, 0.479, "630m"),
    (1.8, 2.0, "160m"),
    (3.5, 4.0, "80m"),
    (5.330, 5.405, "60m"),
    (7.0, 7.3, "40m"),
    (10.1, 10.15, "30m"),
    (14.0, 14.35, "20m"),
    (18.068, 18.168, "17m"),
    (21.0, 21.45, "15m"),
    (24.89, 24.99, "12m"),
    (28.0, 29.7, "10m"),
    (50.0, 54.0, "6m"),
    (70.0, 71.0, "4m"),
    (144.0, 148.0, "2m"),
    (219.0, 225.0, "1.25m"),
    (420.0, 450.0, "70cm"),
    (902.0, 928.0, "33cm"),
    (1240.0, 1300.0, "23cm"),
];

/// Parse an unsigned decimal number such as `14` or `14.062`.
fn parse_decimal(input: &str) -> IResult<&str, f64> {
    map_res(recognize((digit1, opt((char('.'), digit1)))), |s: &str| {
        s.parse::<f64>()
    })
    .parse(input)
}

/// Extract the first decimal number embedded anywhere in `text`.
///
/// ```
/// use hamalert_bridge::band::first_decimal;
///
/// assert_eq!(first_decimal("f=14062.5 kHz"), Some(14062.5));
/// assert_eq!(first_decimal("n/a"), None);
/// ```
pub fn first_decimal(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    parse_decimal(&text[start..]).ok().map(|(_, value)| value)
}

/// Apply the kHz heuristic: anything at or above 1000 is divided down to MHz.
#[inline]
pub fn to_mhz(value: f64) -> f64 {
    if value >= KHZ_THRESHOLD {
        value / 1000.0
    } else {
        value
    }
}

/// Normalize a frequency field to megahertz.
///
/// Accepts JSON numbers and strings; returns `None` when there is no number
/// to be found.
pub fn parse_mhz(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => first_decimal(s)?,
        _ => return None,
    };
    Some(to_mhz(raw))
}

/// Map a frequency in MHz to its band label.
///
/// Returns [`UNKNOWN_BAND`] when the frequency is outside every allocation.
pub fn band_from_mhz(mhz: f64) -> &'static str {
    BANDS
        .iter()
        .find(|(lo, hi, _)| (*lo..=*hi).contains(&mhz))
        .map(|(_, _, label)| *label)
        .unwrap_or(UNKNOWN_BAND)
}
