use std::fs;

use cnyfix::RateStore;

#[test]
fn canonical_header_file_is_read_and_rewritten_in_chinese() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rates.csv");
    fs::write(
        &path,
        "\u{feff}year,month,mid_rate,query_date,source_date,rate_source,fallback_used\n\
         2022,12,6.9646,2022-12-01,2022-12-01,pbc_notice,none\n",
    )
    .unwrap();

    let store = RateStore::new(&path);
    store
        .upsert([vec![("year", "2023"), ("month", "1"), ("mid_rate", "6.9475")]])
        .unwrap();

    let rows = store.load().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[&(2022, 12)].mid_rate, "6.9646");
    assert!(fs::read_to_string(&path).unwrap().starts_with("年份,月份,"));
}

#[test]
fn alias_headers_in_any_order_are_understood() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rates.csv");
    fs::write(
        &path,
        "月份,年份,中间价(1美元),首个工作日,公告日期,来源渠道,备注\n\
         7,2023,7.2258,2023-07-03,2023-07-03,safe_portal,手工录入\n",
    )
    .unwrap();

    let rows = RateStore::new(&path).load().unwrap();
    let july = &rows[&(2023, 7)];
    assert_eq!(july.mid_rate, "7.2258");
    assert_eq!(july.query_date, "2023-07-03");
    assert_eq!(july.rate_source, "safe_portal");
    assert_eq!(july.fallback_used, "none");
}

#[test]
fn headerless_files_are_read_positionally() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rates.csv");
    fs::write(
        &path,
        "2022,11,7.1617,2022-11-01,2022-11-01,cfets_notice,none\n\
         2022,12,6.9646,,2022-12-01,pbc_notice,\n",
    )
    .unwrap();

    let rows = RateStore::new(&path).load().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[&(2022, 11)].rate_source, "cfets_notice");
    let december = &rows[&(2022, 12)];
    assert_eq!(december.query_date, "2022-12-01", "falls back to source date");
    assert_eq!(december.fallback_used, "none");
}

#[test]
fn unusable_rows_are_skipped_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rates.csv");
    fs::write(
        &path,
        "年份,月份,中间价\n\
         abcd,01,7.0\n\
         2023,13,7.0\n\
         ,,\n\
         2023,2,6.7492\n",
    )
    .unwrap();

    let rows = RateStore::new(&path).load().unwrap();
    assert_eq!(rows.keys().copied().collect::<Vec<_>>(), [(2023, 2)]);
}

#[test]
fn empty_or_absent_files_are_empty_stores() {
    let dir = tempfile::tempdir().unwrap();
    assert!(RateStore::new(dir.path().join("none.csv")).load().unwrap().is_empty());

    let empty = dir.path().join("empty.csv");
    fs::write(&empty, "").unwrap();
    assert!(RateStore::new(&empty).load().unwrap().is_empty());
}
