use chrono::{Datelike, NaiveDate};
use serde_json::Value;

use crate::{Decision, Denial};

pub const ADULT_AGE: u32 = 18;

/// Completed years between `birth` and `today`.
///
/// A birthday that has not yet happened this year does not count, so a
/// 29 February birthday is reached on 1 March in common years.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> u32 {
    if birth > today {
        return 0;
    }
    let mut years = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    u32::try_from(years).unwrap_or(0)
}

/// Birth date of a student row (`birth_date` or `birthDate`).
///
/// Accepts plain dates and RFC 3339 timestamps.
pub fn birth_date_of(row: &Value) -> Option<NaiveDate> {
    let raw = row
        .get("birth_date")
        .or_else(|| row.get("birthDate"))?
        .as_str()?
        .trim();
    let date_part = raw.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Block principals that are students under [`ADULT_AGE`].
///
/// `student_row` is the principal's own student record, if any; principals
/// without one are not students and pass. A row without a usable birth date
/// is treated as a minor.
pub fn check_age(student_row: Option<&Value>, today: NaiveDate) -> Decision {
    let Some(row) = student_row else {
        return Ok(());
    };

    let Some(birth) = birth_date_of(row) else {
        return Err(Denial::minor("student record has no usable birth date"));
    };

    let age = age_on(birth, today);
    if age < ADULT_AGE {
        Err(Denial::minor(format!("student is {age} years old")))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Months;
    use serde_json::json;

    use super::*;
    use crate::{DenialCode, DenialKind};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn row(birth: NaiveDate) -> Value {
        json!({ "name": "Aluno", "birth_date": birth.format("%Y-%m-%d").to_string() })
    }

    #[test]
    fn exactly_eighteen_is_allowed_one_day_short_is_blocked() {
        let today = date("2026-10-19");
        let eighteen = today.checked_sub_months(Months::new(12 * 18)).unwrap();
        let one_day_short = eighteen.succ_opt().unwrap();

        assert_eq!(check_age(Some(&row(eighteen)), today), Ok(()));

        let denial = check_age(Some(&row(one_day_short)), today).unwrap_err();
        assert_eq!(denial.kind, DenialKind::AgeBlocked);
        assert_eq!(denial.code, DenialCode::MinorStudentBlocked);
    }

    #[test]
    fn leap_day_birthday_counts_from_first_of_march() {
        let birth = date("2008-02-29");
        assert_eq!(age_on(birth, date("2026-02-28")), 17);
        assert_eq!(age_on(birth, date("2026-03-01")), 18);
        assert_eq!(age_on(birth, date("2028-02-29")), 20);
    }

    #[test]
    fn naive_year_difference_would_be_wrong() {
        assert_eq!(age_on(date("2008-12-31"), date("2026-01-01")), 17);
        assert_eq!(age_on(date("2030-01-01"), date("2026-01-01")), 0);
    }

    #[test]
    fn non_students_pass() {
        assert_eq!(check_age(None, date("2026-10-19")), Ok(()));
    }

    #[test]
    fn missing_or_garbled_birth_date_fails_closed() {
        let today = date("2026-10-19");
        assert!(check_age(Some(&json!({ "name": "Aluno" })), today).is_err());
        assert!(check_age(Some(&json!({ "birth_date": "19/10/2000" })), today).is_err());
    }

    #[test]
    fn timestamps_and_camel_case_are_accepted() {
        let today = date("2026-10-19");
        let row = json!({ "birthDate": "2000-05-01T00:00:00Z" });
        assert_eq!(birth_date_of(&row), Some(date("2000-05-01")));
        assert_eq!(check_age(Some(&row), today), Ok(()));
    }
}
