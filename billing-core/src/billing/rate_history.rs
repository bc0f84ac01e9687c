use chrono::{Days, NaiveDate};
use uuid::Uuid;

use crate::error::{BillingError, ValidationErrors};
use crate::models::fee::{AmendFee, Fee};
use crate::models::money::Money;

/// Outcome of applying a rate to a client's history, telling the store
/// what to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateChange {
    /// Rate equals the current one; nothing to write.
    Unchanged,
    /// First entry for the client.
    Opened(Uuid),
    /// The persisted current entry was closed and a new one opened.
    Superseded { closed: Uuid, opened: Uuid },
    /// A not yet persisted current entry had its rate replaced in place.
    Amended(Uuid),
}

/// A client's rate history, kept ordered by `from`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateHistory {
    client_id: Uuid,
    fees: Vec<Fee>,
}

impl RateHistory {
    pub fn new(client_id: Uuid, mut fees: Vec<Fee>) -> Self {
        fees.sort_by_key(|fee| fee.from);
        Self { client_id, fees }
    }

    pub fn fees(&self) -> &[Fee] {
        &self.fees
    }

    pub fn into_fees(self) -> Vec<Fee> {
        self.fees
    }

    pub fn is_empty(&self) -> bool {
        self.fees.is_empty()
    }

    pub fn fee(&self, id: Uuid) -> Option<&Fee> {
        self.fees.iter().find(|fee| fee.id == id)
    }

    /// The open-ended entry, if the client has one.
    pub fn current(&self) -> Option<&Fee> {
        self.fees.iter().find(|fee| fee.is_open())
    }

    pub fn current_rate(&self) -> Option<Money> {
        self.current().map(|fee| fee.rate)
    }

    pub fn current_rate_since(&self) -> Option<NaiveDate> {
        self.current().map(|fee| fee.from)
    }

    /// The entry whose range covers `date`.
    pub fn rate_on(&self, date: NaiveDate) -> Option<Money> {
        self.fees
            .iter()
            .find(|fee| fee.covers(date))
            .map(|fee| fee.rate)
    }

    /// Applies `rate` from `from` onwards.
    ///
    /// - No current entry: opens one.
    /// - Different rate, current entry persisted: closes it the day before
    ///   `from` and opens a new entry.
    /// - Different rate, current entry still pending: replaces its rate.
    /// - Same rate: no-op.
    pub fn apply_new_rate(&mut self, rate: Money, from: NaiveDate) -> RateChange {
        let client_id = self.client_id;
        let Some(current) = self.fees.iter_mut().find(|fee| fee.is_open()) else {
            let fee = Fee::open(client_id, from, rate);
            let opened = fee.id;
            self.push(fee);
            return RateChange::Opened(opened);
        };

        if current.rate == rate {
            return RateChange::Unchanged;
        }

        if !current.persisted {
            current.rate = rate;
            return RateChange::Amended(current.id);
        }

        current.to = Some(from.checked_sub_days(Days::new(1)).unwrap_or(NaiveDate::MIN));
        let closed = current.id;
        let fee = Fee::open(client_id, from, rate);
        let opened = fee.id;
        self.push(fee);
        RateChange::Superseded { closed, opened }
    }

    /// Edits one historical entry in place.
    pub fn amend(&mut self, fee_id: Uuid, amendment: &AmendFee) -> Result<(), BillingError> {
        let fee = self
            .fees
            .iter_mut()
            .find(|fee| fee.id == fee_id)
            .ok_or_else(|| BillingError::not_found("fee", fee_id))?;

        if let Some(from) = amendment.from {
            fee.from = from;
        }
        if let Some(to) = amendment.to {
            fee.to = to;
        }
        if let Some(rate) = amendment.rate {
            fee.rate = rate;
        }
        self.fees.sort_by_key(|fee| fee.from);
        Ok(())
    }

    /// Whole-history checks run whenever the shape of the history changes.
    pub fn validate(&self, errors: &mut ValidationErrors) {
        if self.fees.is_empty() {
            errors.add("fees", "can't be blank");
            return;
        }
        for fee in &self.fees {
            if fee.to.map_or(false, |to| to < fee.from) {
                errors.add(
                    "fees",
                    format!("fee from {} ends before it starts", fee.from.format("%Y-%m-%d")),
                );
            }
        }
        if let Some(fee) = validate_no_overlap(&self.fees) {
            let to = fee
                .to
                .map(|to| to.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "open end".to_string());
            errors.add("fees", format!("fee to {} overlaps with its successor", to));
        }
    }

    fn push(&mut self, fee: Fee) {
        self.fees.push(fee);
        self.fees.sort_by_key(|fee| fee.from);
    }
}

/// Finds the first entry that overlaps its successor.
///
/// `fees` must be ordered by `from`. A pair overlaps when the earlier
/// entry's `to` is on or after the later entry's `from`; an open-ended
/// entry overlaps anything after it. Adjacent ranges (`to + 1 day ==
/// next.from`) are fine.
pub fn validate_no_overlap(fees: &[Fee]) -> Option<&Fee> {
    fees.windows(2)
        .find(|pair| match pair[0].to {
            Some(to) => to >= pair[1].from,
            None => true,
        })
        .map(|pair| &pair[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fee(from: NaiveDate, to: Option<NaiveDate>, pence: i64) -> Fee {
        Fee {
            id: Uuid::new_v4(),
            client_id: Uuid::nil(),
            from,
            to,
            rate: Money::gbp(pence),
            persisted: true,
        }
    }

    fn three_fees(gap_days: i64) -> Vec<Fee> {
        let first_to = date(2023, 6, 1);
        let second_from = first_to + chrono::Duration::days(1 + gap_days);
        let second_to = date(2024, 1, 31);
        vec![
            fee(date(2022, 12, 1), Some(first_to), 5000),
            fee(second_from, Some(second_to), 5500),
            fee(date(2024, 2, 1), None, 6000),
        ]
    }

    #[test]
    fn test_empty_and_single_histories_never_overlap() {
        assert!(validate_no_overlap(&[]).is_none());
        assert!(validate_no_overlap(&[fee(date(2024, 1, 1), None, 6000)]).is_none());
    }

    #[test]
    fn test_adjacent_ranges_are_valid() {
        assert!(validate_no_overlap(&three_fees(0)).is_none());
    }

    #[test]
    fn test_gapped_ranges_are_valid() {
        assert!(validate_no_overlap(&three_fees(10)).is_none());
    }

    #[test]
    fn test_equal_boundary_overlaps() {
        let fees = vec![
            fee(date(2024, 1, 1), Some(date(2024, 2, 1)), 5000),
            fee(date(2024, 2, 1), None, 6000),
        ];
        assert_eq!(validate_no_overlap(&fees).map(|f| f.rate), Some(Money::gbp(5000)));
    }

    #[test]
    fn test_overlap_is_reported_with_date() {
        let history = RateHistory::new(Uuid::nil(), three_fees(-5));
        let mut errors = ValidationErrors::new();
        history.validate(&mut errors);
        assert_eq!(
            errors.get("fees"),
            ["fee to 2023-06-01 overlaps with its successor".to_string()]
        );
    }

    #[test]
    fn test_empty_history_is_invalid() {
        let mut errors = ValidationErrors::new();
        RateHistory::new(Uuid::nil(), Vec::new()).validate(&mut errors);
        assert!(errors.contains("fees"));
    }

    #[test]
    fn test_first_rate_opens_entry() {
        let mut history = RateHistory::new(Uuid::nil(), Vec::new());
        let change = history.apply_new_rate(Money::gbp(6000), date(2025, 1, 1));

        assert!(matches!(change, RateChange::Opened(_)));
        assert_eq!(history.current_rate(), Some(Money::gbp(6000)));
        assert_eq!(history.current_rate_since(), Some(date(2025, 1, 1)));
    }

    #[test]
    fn test_same_rate_is_a_no_op() {
        let mut history = RateHistory::new(
            Uuid::nil(),
            vec![fee(date(2025, 1, 1), None, 6000)],
        );
        let before = history.clone();

        assert_eq!(
            history.apply_new_rate(Money::gbp(6000), date(2025, 3, 1)),
            RateChange::Unchanged
        );
        assert_eq!(history, before);
    }

    #[test]
    fn test_new_rate_supersedes_persisted_entry() {
        let mut history = RateHistory::new(
            Uuid::nil(),
            vec![fee(date(2025, 1, 1), None, 6000)],
        );

        let change = history.apply_new_rate(Money::gbp(7000), date(2025, 3, 1));
        assert!(matches!(change, RateChange::Superseded { .. }));

        let fees = history.fees();
        assert_eq!(fees.len(), 2);
        assert_eq!(fees[0].to, Some(date(2025, 2, 28)));
        assert_eq!(fees[0].to.unwrap() + chrono::Duration::days(1), fees[1].from);
        assert_eq!(fees[1].rate, Money::gbp(7000));
        assert!(fees[1].is_open());

        let mut errors = ValidationErrors::new();
        history.validate(&mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_pending_entry_is_amended_in_place() {
        let mut history = RateHistory::new(Uuid::nil(), Vec::new());
        history.apply_new_rate(Money::gbp(6000), date(2025, 1, 1));

        let change = history.apply_new_rate(Money::gbp(6500), date(2025, 1, 1));
        assert!(matches!(change, RateChange::Amended(_)));
        assert_eq!(history.fees().len(), 1);
        assert_eq!(history.current_rate(), Some(Money::gbp(6500)));
    }

    #[test]
    fn test_backdated_rate_creates_overlap() {
        let mut history = RateHistory::new(
            Uuid::nil(),
            vec![fee(date(2025, 3, 1), None, 6000)],
        );
        history.apply_new_rate(Money::gbp(7000), date(2025, 1, 1));

        let mut errors = ValidationErrors::new();
        history.validate(&mut errors);
        assert!(errors.contains("fees"));
    }

    #[test]
    fn test_same_day_rate_change_closes_entry_before_it_starts() {
        let mut history = RateHistory::new(
            Uuid::nil(),
            vec![fee(date(2025, 3, 1), None, 6000)],
        );
        history.apply_new_rate(Money::gbp(7000), date(2025, 3, 1));

        let mut errors = ValidationErrors::new();
        history.validate(&mut errors);
        assert!(errors
            .get("fees")
            .contains(&"fee from 2025-03-01 ends before it starts".to_string()));
    }

    #[test]
    fn test_amending_history_can_introduce_overlap() {
        let fees = three_fees(0);
        let middle = fees[1].id;
        let mut history = RateHistory::new(Uuid::nil(), fees);

        history
            .amend(
                middle,
                &AmendFee {
                    to: Some(Some(date(2024, 3, 1))),
                    ..Default::default()
                },
            )
            .unwrap();

        let mut errors = ValidationErrors::new();
        history.validate(&mut errors);
        assert_eq!(
            errors.get("fees"),
            ["fee to 2024-03-01 overlaps with its successor".to_string()]
        );
    }

    #[test]
    fn test_rate_on_date() {
        let history = RateHistory::new(Uuid::nil(), three_fees(0));
        assert_eq!(history.rate_on(date(2023, 1, 1)), Some(Money::gbp(5000)));
        assert_eq!(history.rate_on(date(2025, 1, 1)), Some(Money::gbp(6000)));
        assert_eq!(history.rate_on(date(2020, 1, 1)), None);
    }
}
