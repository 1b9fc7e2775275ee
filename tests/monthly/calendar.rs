use cnyfix::monthly::{candidate_dates, iter_months, month_bounds};
use cnyfix::{BusinessCalendar, FxError, first_business_day};

use crate::common::day;

#[test]
fn weekend_new_year_pushes_to_monday() {
    let cal = BusinessCalendar::default();
    assert_eq!(first_business_day(&cal, 2023, 1).unwrap(), day(2023, 1, 2));
    assert_eq!(first_business_day(&cal, 2023, 7).unwrap(), day(2023, 7, 3));
    assert_eq!(first_business_day(&cal, 2025, 10).unwrap(), day(2025, 10, 1));
}

#[test]
fn holidays_and_makeup_workdays_override_weekdays() {
    let golden_week = BusinessCalendar::new((1..=8).map(|d| day(2025, 10, d)), []);
    assert_eq!(golden_week.first_business_day(2025, 10).unwrap(), day(2025, 10, 9));

    let makeup = BusinessCalendar::new([], [day(2023, 7, 1)]);
    assert!(makeup.is_business_day(day(2023, 7, 1)));
    assert!(!makeup.is_business_day(day(2023, 7, 2)));
    assert_eq!(makeup.first_business_day(2023, 7).unwrap(), day(2023, 7, 1));

    let both = BusinessCalendar::new([day(2023, 7, 1)], [day(2023, 7, 1)]);
    assert!(!both.is_business_day(day(2023, 7, 1)), "holiday wins");
}

#[test]
fn a_month_without_business_days_is_a_config_error() {
    let all_off = BusinessCalendar::new((1..=28).map(|d| day(2026, 2, d)), []);
    let err = all_off.first_business_day(2026, 2).unwrap_err();
    assert!(matches!(err, FxError::Config(_)), "got {err:?}");
}

#[test]
fn invalid_month_is_rejected() {
    assert!(month_bounds(2025, 13).is_err());
    assert_eq!(month_bounds(2024, 2).unwrap(), (day(2024, 2, 1), day(2024, 2, 29)));
    assert_eq!(month_bounds(2024, 12).unwrap(), (day(2024, 12, 1), day(2024, 12, 31)));
}

#[test]
fn candidates_go_forward_then_back_to_the_first() {
    let cal = BusinessCalendar::default();
    assert_eq!(
        candidate_dates(&cal, 2023, 7).unwrap(),
        [
            day(2023, 7, 3),
            day(2023, 7, 4),
            day(2023, 7, 5),
            day(2023, 7, 6),
            day(2023, 7, 2),
            day(2023, 7, 1),
        ]
    );
    // the 1st is a business day: forward only, skipping the weekend
    assert_eq!(
        candidate_dates(&cal, 2025, 10).unwrap(),
        [day(2025, 10, 1), day(2025, 10, 2), day(2025, 10, 3), day(2025, 10, 6)]
    );
}

#[test]
fn forward_probes_stay_inside_the_month() {
    let cal = BusinessCalendar::new((2..=31).map(|d| day(2025, 12, d)), []);
    assert_eq!(candidate_dates(&cal, 2025, 12).unwrap(), [day(2025, 12, 1)]);
}

#[test]
fn months_iterate_across_year_end() {
    let months: Vec<_> = iter_months(day(2023, 11, 15), day(2024, 2, 1)).collect();
    assert_eq!(months, [(2023, 11), (2023, 12), (2024, 1), (2024, 2)]);
    assert_eq!(iter_months(day(2024, 3, 1), day(2024, 2, 1)).count(), 0);
}

#[test]
fn toml_overrides_parse() {
    let cal = BusinessCalendar::from_toml_str(
        r#"
        holidays = ["2025-10-01", "2025-10-02", "2025-10-03"]
        workdays = ["2025-09-28"]
        "#,
    )
    .unwrap();
    assert_eq!(cal.holidays().len(), 3);
    assert!(cal.is_business_day(day(2025, 9, 28)));
    assert_eq!(cal.first_business_day(2025, 10).unwrap(), day(2025, 10, 6));

    let empty = BusinessCalendar::from_toml_str("").unwrap();
    assert_eq!(empty, BusinessCalendar::default());
}

#[test]
fn broken_toml_is_a_calendar_error() {
    let err = BusinessCalendar::from_toml_str("holidays = [\"2025-13-40\"]").unwrap_err();
    assert!(matches!(err, FxError::Calendar(_)), "got {err:?}");
}

#[test]
fn calendar_file_is_optional() {
    let dir = tempfile::tempdir().unwrap();
    let missing = BusinessCalendar::from_toml_file(dir.path().join("holidays.toml")).unwrap();
    assert_eq!(missing, BusinessCalendar::default());

    let path = dir.path().join("calendar.toml");
    std::fs::write(&path, "holidays = [\"2024-01-01\"]\n").unwrap();
    let loaded = BusinessCalendar::from_toml_file(&path).unwrap();
    assert_eq!(loaded.first_business_day(2024, 1).unwrap(), day(2024, 1, 2));
}
