//! Fixed-point asset amounts and rational exchange rates
//!
//! Amounts are held as integer base units of their asset's fixed precision
//! (18 fractional digits for the native and custom assets, 6 for the stable
//! asset). Converting between assets always goes through a [`Rate`] and both
//! precision factors; there is no implicit mixing.
//!
//! All conversions round toward zero, matching ledger integer division.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::errors::AmountError;

/// Asset kinds the gateway can exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Asset {
    /// The ledger's native asset (paid as value attached to a submission)
    NATIVE,
    /// Stable-value token
    STABLE,
    /// Custom fungible token issued alongside the exchange
    CUSTOM,
}

impl Asset {
    /// All assets, in a stable order
    pub const ALL: [Asset; 3] = [Asset::NATIVE, Asset::STABLE, Asset::CUSTOM];

    /// Number of fractional digits in one whole unit
    pub fn precision(&self) -> u32 {
        match self {
            Asset::NATIVE => 18,
            Asset::STABLE => 6,
            Asset::CUSTOM => 18,
        }
    }

    /// Base units per whole unit (10^precision)
    pub fn unit(&self) -> u128 {
        10u128.pow(self.precision())
    }

    /// Whether spending this asset through the exchange requires a prior
    /// spending authorization. The native asset is attached as value instead.
    pub fn needs_authorization(&self) -> bool {
        !matches!(self, Asset::NATIVE)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Asset::NATIVE => "NATIVE",
            Asset::STABLE => "STABLE",
            Asset::CUSTOM => "CUSTOM",
        }
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-negative amount of one asset in base units
///
/// Invariant: `units` is always denominated in `asset.precision()` digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AssetAmount {
    asset: Asset,
    units: u128,
}

impl AssetAmount {
    /// Create from raw base units
    pub fn from_units(asset: Asset, units: u128) -> Self {
        Self { asset, units }
    }

    /// Zero of the given asset
    pub fn zero(asset: Asset) -> Self {
        Self { asset, units: 0 }
    }

    /// Parse a string-encoded decimal (e.g. `"120.5"`) into base units.
    ///
    /// Rejects empty, malformed, negative, and zero inputs as well as inputs
    /// with more fractional digits than the asset supports.
    pub fn parse(asset: Asset, input: &str) -> Result<Self, AmountError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(AmountError::Empty);
        }

        let value = Decimal::from_str_exact(trimmed)
            .map_err(|_| AmountError::Malformed(trimmed.to_string()))?;

        Self::from_decimal(asset, value)
    }

    /// Convert a positive decimal into base units without rounding
    pub fn from_decimal(asset: Asset, value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NonPositive(value.to_string()));
        }

        let value = value.normalize();
        let scale = value.scale();
        if scale > asset.precision() {
            return Err(AmountError::TooPrecise {
                value: value.to_string(),
                asset,
                precision: asset.precision(),
            });
        }

        let mantissa = u128::try_from(value.mantissa()).map_err(|_| AmountError::Overflow)?;
        let units = mantissa
            .checked_mul(10u128.pow(asset.precision() - scale))
            .ok_or(AmountError::Overflow)?;

        Ok(Self { asset, units })
    }

    pub fn asset(&self) -> Asset {
        self.asset
    }

    pub fn units(&self) -> u128 {
        self.units
    }

    pub fn is_zero(&self) -> bool {
        self.units == 0
    }

    /// Decimal view, if it fits in a `Decimal`
    pub fn to_decimal(&self) -> Option<Decimal> {
        let units = i128::try_from(self.units).ok()?;
        Decimal::try_from_i128_with_scale(units, self.asset.precision()).ok()
    }

    /// Checked addition of two amounts of the same asset
    pub fn checked_add(&self, other: AssetAmount) -> Result<AssetAmount, AmountError> {
        self.ensure_same_asset(other)?;
        let units = self.units.checked_add(other.units).ok_or(AmountError::Overflow)?;
        Ok(Self::from_units(self.asset, units))
    }

    /// Subtraction of two amounts of the same asset, clamped at zero
    pub fn saturating_sub(&self, other: AssetAmount) -> Result<AssetAmount, AmountError> {
        self.ensure_same_asset(other)?;
        Ok(Self::from_units(self.asset, self.units.saturating_sub(other.units)))
    }

    fn ensure_same_asset(&self, other: AssetAmount) -> Result<(), AmountError> {
        if self.asset != other.asset {
            return Err(AmountError::AssetMismatch {
                left: self.asset,
                right: other.asset,
            });
        }
        Ok(())
    }
}

impl PartialOrd for AssetAmount {
    /// Amounts of different assets are incomparable.
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        if self.asset != other.asset {
            return None;
        }
        Some(self.units.cmp(&other.units))
    }
}

impl fmt::Display for AssetAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = self.asset.unit();
        let whole = self.units / unit;
        let frac = self.units % unit;
        if frac == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{:0width$}", frac, width = self.asset.precision() as usize);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl Serialize for AssetAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AssetAmount", 3)?;
        state.serialize_field("asset", &self.asset)?;
        state.serialize_field("amount", &self.to_string())?;
        state.serialize_field("units", &self.units.to_string())?;
        state.end()
    }
}

/// Exchange rate as an exact rational: whole units of the output asset
/// received per whole unit of the input asset.
///
/// Always kept in lowest terms with a non-zero denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rate {
    numerator: u128,
    denominator: u128,
}

impl Rate {
    /// Create a rate `numerator / denominator`
    pub fn new(numerator: u128, denominator: u128) -> Result<Self, AmountError> {
        if denominator == 0 {
            return Err(AmountError::ZeroRate);
        }
        let g = gcd(numerator, denominator).max(1);
        Ok(Self {
            numerator: numerator / g,
            denominator: denominator / g,
        })
    }

    /// Create a rate from a fixed-point integer with `decimals` fractional digits
    pub fn from_scaled(raw: u128, decimals: u32) -> Result<Self, AmountError> {
        let scale = 10u128.checked_pow(decimals).ok_or(AmountError::Overflow)?;
        Self::new(raw, scale)
    }

    pub fn numerator(&self) -> u128 {
        self.numerator
    }

    pub fn denominator(&self) -> u128 {
        self.denominator
    }

    pub fn is_zero(&self) -> bool {
        self.numerator == 0
    }

    /// The rate for the opposite direction
    pub fn inverse(&self) -> Result<Self, AmountError> {
        if self.numerator == 0 {
            return Err(AmountError::ZeroRate);
        }
        Self::new(self.denominator, self.numerator)
    }

    /// Convert `amount` into `to` at this rate, rescaling through both
    /// assets' precision factors. Rounds toward zero.
    pub fn convert(&self, amount: AssetAmount, to: Asset) -> Result<AssetAmount, AmountError> {
        let from_precision = amount.asset().precision();
        let to_precision = to.precision();

        let (num, den) = if to_precision >= from_precision {
            let factor = 10u128.pow(to_precision - from_precision);
            (
                self.numerator.checked_mul(factor).ok_or(AmountError::Overflow)?,
                self.denominator,
            )
        } else {
            let factor = 10u128.pow(from_precision - to_precision);
            (
                self.numerator,
                self.denominator.checked_mul(factor).ok_or(AmountError::Overflow)?,
            )
        };

        let g = gcd(num, den).max(1);
        let units = mul_div_floor(amount.units(), num / g, den / g)?;
        Ok(AssetAmount::from_units(to, units))
    }

    /// Decimal view rounded to 18 fractional digits, if representable
    pub fn to_decimal(&self) -> Option<Decimal> {
        let num = Decimal::from_u128(self.numerator)?;
        let den = Decimal::from_u128(self.denominator)?;
        num.checked_div(den).map(|d| d.round_dp(18).normalize())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_decimal() {
            Some(d) => write!(f, "{d}"),
            None => write!(f, "{}/{}", self.numerator, self.denominator),
        }
    }
}

impl Serialize for Rate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

fn gcd(mut a: u128, mut b: u128) -> u128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// `floor(a * b / c)` without intermediate overflow where avoidable
fn mul_div_floor(a: u128, b: u128, c: u128) -> Result<u128, AmountError> {
    if c == 0 {
        return Err(AmountError::ZeroRate);
    }
    if let Some(product) = a.checked_mul(b) {
        return Ok(product / c);
    }
    // a*b/c = (a/c)*b + (a%c)*b/c
    let q = a / c;
    let r = a % c;
    let high = q.checked_mul(b).ok_or(AmountError::Overflow)?;
    let low = r.checked_mul(b).ok_or(AmountError::Overflow)? / c;
    high.checked_add(low).ok_or(AmountError::Overflow)
}
