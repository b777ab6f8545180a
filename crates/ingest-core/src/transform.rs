//! 원시 JSON 필드 정제 헬퍼.
//!
//! 소스의 `transform` 구현에서 공통으로 사용합니다.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as Json;
use std::str::FromStr;

use crate::types::Record;

/// 결측으로 취급하는 문자열 리터럴 (소문자 비교).
const MISSING_LITERALS: &[&str] = &["null", "none", "n/a", "na"];

/// 시장 별칭.
const MARKET_ALIASES: &[(&str, &str)] = &[("BIN", "BINANCE"), ("CB", "COINBASE"), ("KRK", "KRAKEN")];

fn is_missing_literal(s: &str) -> bool {
    s.is_empty() || MISSING_LITERALS.iter().any(|m| s.eq_ignore_ascii_case(m))
}

/// 숫자 문자열 전처리. 결측이면 None.
fn numeric_text(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if is_missing_literal(trimmed) {
        return None;
    }
    Some(trimmed.replace(',', ""))
}

/// JSON 값을 유한한 f64로 정제합니다.
///
/// null, NaN, 무한대, 빈 문자열, 결측 리터럴은 None입니다.
/// 문자열의 천 단위 구분자(`,`)는 제거합니다.
pub fn clean_numeric(value: Option<&Json>) -> Option<f64> {
    let parsed = match value? {
        Json::Number(n) => n.as_f64(),
        Json::String(s) => numeric_text(s).and_then(|t| t.parse::<f64>().ok()),
        _ => None,
    }?;
    parsed.is_finite().then_some(parsed)
}

/// JSON 값을 Decimal로 정제합니다. 규칙은 [`clean_numeric`]과 같습니다.
pub fn clean_decimal(value: Option<&Json>) -> Option<Decimal> {
    match value? {
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64()
                    .filter(|f| f.is_finite())
                    .and_then(Decimal::from_f64)
            }
        }
        Json::String(s) => {
            let text = numeric_text(s)?;
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        _ => None,
    }
}

/// JSON 값을 정수로 정제합니다.
pub fn clean_int(value: Option<&Json>) -> Option<i64> {
    match value? {
        Json::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i64)
        }),
        Json::String(s) => numeric_text(s).and_then(|t| t.parse::<i64>().ok()),
        _ => None,
    }
}

/// JSON 값을 공백 제거된 문자열로 정제합니다.
///
/// 문자열이 아닌 스칼라는 문자열로 변환합니다. 배열/객체는 None.
pub fn clean_string(value: Option<&Json>) -> Option<String> {
    let text = match value? {
        Json::String(s) => s.trim().to_string(),
        Json::Number(n) => n.to_string(),
        Json::Bool(b) => b.to_string(),
        _ => return None,
    };
    if is_missing_literal(&text) {
        None
    } else {
        Some(text)
    }
}

/// 필수 컬럼이 모두 존재하고 null이 아닌지 확인합니다.
pub fn has_required_fields(record: &Record, required: &[&str]) -> bool {
    required
        .iter()
        .all(|field| record.get(field).is_some_and(|v| !v.is_null()))
}

/// 시장/종목 이름을 표준화합니다 (대문자, 공백 제거, 시장 별칭 적용).
pub fn standardize_market_instrument(market: &str, instrument: &str) -> (String, String) {
    let market = market.trim().to_uppercase();
    let market = MARKET_ALIASES
        .iter()
        .find(|(alias, _)| *alias == market)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(market);

    (market, instrument.trim().to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_clean_numeric() {
        assert_eq!(clean_numeric(Some(&json!(1.5))), Some(1.5));
        assert_eq!(clean_numeric(Some(&json!(" 1,234.5 "))), Some(1234.5));
        assert_eq!(clean_numeric(Some(&json!("N/A"))), None);
        assert_eq!(clean_numeric(Some(&json!("none"))), None);
        assert_eq!(clean_numeric(Some(&json!(""))), None);
        assert_eq!(clean_numeric(Some(&json!("inf"))), None);
        assert_eq!(clean_numeric(Some(&json!(null))), None);
        assert_eq!(clean_numeric(None), None);
    }

    #[test]
    fn test_clean_decimal() {
        assert_eq!(clean_decimal(Some(&json!(42))), Some(dec!(42)));
        assert_eq!(clean_decimal(Some(&json!("1,000.25"))), Some(dec!(1000.25)));
        assert_eq!(clean_decimal(Some(&json!("1e3"))), Some(dec!(1000)));
        assert_eq!(clean_decimal(Some(&json!("na"))), None);
        assert_eq!(clean_decimal(Some(&json!([1]))), None);
    }

    #[test]
    fn test_clean_int_and_string() {
        assert_eq!(clean_int(Some(&json!(7))), Some(7));
        assert_eq!(clean_int(Some(&json!(7.0))), Some(7));
        assert_eq!(clean_int(Some(&json!(7.5))), None);
        assert_eq!(clean_int(Some(&json!("1,024"))), Some(1024));

        assert_eq!(clean_string(Some(&json!("  BTC "))), Some("BTC".to_string()));
        assert_eq!(clean_string(Some(&json!(12))), Some("12".to_string()));
        assert_eq!(clean_string(Some(&json!("NULL"))), None);
        assert_eq!(clean_string(Some(&json!({"a": 1}))), None);
    }

    #[test]
    fn test_has_required_fields() {
        let record = Record::new().with("a", 1i64).with("b", None::<i64>);
        assert!(has_required_fields(&record, &["a"]));
        assert!(!has_required_fields(&record, &["a", "b"]));
        assert!(!has_required_fields(&record, &["c"]));
    }

    #[test]
    fn test_standardize_market_instrument() {
        assert_eq!(
            standardize_market_instrument(" cb ", "btc-usd"),
            ("COINBASE".to_string(), "BTC-USD".to_string())
        );
        assert_eq!(
            standardize_market_instrument("bitstamp", "eth-usd"),
            ("BITSTAMP".to_string(), "ETH-USD".to_string())
        );
    }
}
