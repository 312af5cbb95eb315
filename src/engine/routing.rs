//! Payment rail selection

use rust_decimal::Decimal;

use crate::aggregate::PaymentRail;
use crate::domain::Currency;

/// ISO-3166 alpha-2 codes of the SEPA eurozone members.
const EUROZONE: [&str; 20] = [
    "AT", "BE", "CY", "DE", "EE", "ES", "FI", "FR", "GR", "HR", "IE", "IT", "LT", "LU", "LV",
    "MT", "NL", "PT", "SI", "SK",
];

pub fn is_eurozone(country: &str) -> bool {
    EUROZONE.contains(&country)
}

/// Pick the rail for a payment.
///
/// Internal transfers stay on the book. USD to the US clears over ACH and EUR
/// inside the eurozone over SEPA; an empty destination country is treated as
/// domestic for the currency. Everything else goes over SWIFT.
pub fn select_rail(
    _amount: Decimal,
    currency: Currency,
    is_internal: bool,
    destination_country: &str,
) -> PaymentRail {
    if is_internal {
        return PaymentRail::Internal;
    }

    let country = destination_country.trim().to_ascii_uppercase();
    match currency.code() {
        "USD" if country.is_empty() || country == "US" => PaymentRail::Ach,
        "EUR" if country.is_empty() || is_eurozone(&country) => PaymentRail::Sepa,
        _ => PaymentRail::Swift,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_internal_always_internal() {
        let rail = select_rail(dec!(1000000), Currency::EUR, true, "JP");
        assert_eq!(rail, PaymentRail::Internal);
    }

    #[test]
    fn test_usd_routing() {
        assert_eq!(select_rail(dec!(10), Currency::USD, false, "US"), PaymentRail::Ach);
        assert_eq!(select_rail(dec!(10), Currency::USD, false, ""), PaymentRail::Ach);
        assert_eq!(select_rail(dec!(10), Currency::USD, false, "us"), PaymentRail::Ach);
        assert_eq!(select_rail(dec!(10), Currency::USD, false, "GB"), PaymentRail::Swift);
    }

    #[test]
    fn test_eur_routing() {
        assert_eq!(select_rail(dec!(10), Currency::EUR, false, "DE"), PaymentRail::Sepa);
        assert_eq!(select_rail(dec!(10), Currency::EUR, false, "HR"), PaymentRail::Sepa);
        assert_eq!(select_rail(dec!(10), Currency::EUR, false, ""), PaymentRail::Sepa);
        assert_eq!(select_rail(dec!(10), Currency::EUR, false, "CH"), PaymentRail::Swift);
    }

    #[test]
    fn test_other_currency_swift() {
        let gbp = Currency::new("GBP").unwrap();
        assert_eq!(select_rail(dec!(10), gbp, false, "GB"), PaymentRail::Swift);
        assert_eq!(select_rail(dec!(10), gbp, false, ""), PaymentRail::Swift);
    }
}
