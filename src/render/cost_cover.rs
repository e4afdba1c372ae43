//! Payment certificate cover sheet.
//!
//! The cover sheet aggregates one contract payment: the contract amounts,
//! change-order totals grouped by split-number prefix, mobilization
//! deductions, and the payment metadata (period dates, running number,
//! reviewer). Which column receives the figures depends on where the payment
//! sits in the review cycle, so a sheet that already exists on disk is
//! reopened and the next stage column is filled beside the previous one.

use chrono::{Datelike, NaiveDate, Utc};
use serde_json::Value;

use super::mapping::CellMap;
use super::{
    cost_endpoint, number_field, result_rows, RecordRef, RenderError, RenderJob, RenderedArtifact,
    Renderer,
};

/// How many months to walk back looking for the latest payment period.
const MONTH_LOOKBACK: u32 = 36;

const ARABIC_MONTHS: [&str; 12] = [
    "يناير",
    "فبراير",
    "مارس",
    "أبريل",
    "مايو",
    "يونيو",
    "يوليو",
    "أغسطس",
    "سبتمبر",
    "أكتوبر",
    "نوفمبر",
    "ديسمبر",
];

pub(crate) async fn render(
    r: &Renderer,
    record: &RecordRef,
) -> Result<RenderedArtifact, RenderError> {
    let payments = result_rows(
        &r.gateway
            .call(&cost_endpoint(&record.project_id, "payments"), &[])
            .await?,
    );
    let cost_items = result_rows(
        &r.gateway
            .call(&cost_endpoint(&record.project_id, "cost-items"), &[])
            .await?,
    );

    let today = Utc::now().date_naive();
    let payment = select_payment(&payments, record.cost_id.as_deref(), today)
        .ok_or(RenderError::NoPayments)?;
    let payment_id = payment["id"].as_str().ok_or(RenderError::NoPayments)?;
    log::info!("cost cover for payment {payment_id}");

    // A sheet generated for an earlier stage of this payment is reused so
    // the stages accumulate side by side.
    let reused = r.config.output_dir.join(format!("{payment_id}.xlsx"));
    let (template, is_new) = if reused.exists() {
        (reused, false)
    } else {
        (
            r.config.template_dir.join("cost_cover_template.xlsx"),
            true,
        )
    };

    let map = &r.map;
    let column = stage_column(map, payment["status"].as_str(), is_new);
    let mut job = RenderJob::new(template, payment_id);

    if let Some(date) = parse_date(payment["startDate"].as_str()) {
        job.write(map.start_date_cell.clone(), format_arabic_date(date));
    }
    if let Some(date) = parse_date(payment["endDate"].as_str()) {
        let formatted = format_arabic_date(date);
        job.write(map.end_date_cell.clone(), formatted.clone());
        job.write(
            map.title_cell.clone(),
            map.title_template.replace("{end_date}", &formatted),
        );
    }
    if let Some(seq) = payment_sequence(payment) {
        job.write(map.sequence_cell.clone(), seq.clone());
        job.write(
            map.subtitle_cell.clone(),
            map.subtitle_template.replace("{seq}", &seq),
        );
    }

    let rows = &map.amount_rows;
    job.write(
        format!("{column}{}", rows.original_amount),
        number_field(&payment["originalAmount"]).unwrap_or(0.0),
    );
    job.write(
        format!("{column}{}", rows.period_amount),
        number_field(&payment["amount"]).unwrap_or(0.0),
    );
    job.write(
        format!("{column}{}", rows.materials),
        number_field(&payment["materials"]).unwrap_or(0.0),
    );

    // Change orders of this contract, bucketed by split-number prefix.
    let contract_id = payment["associationId"].as_str();
    let contract_items: Vec<Value> = cost_items
        .iter()
        .filter(|item| item["contractId"].as_str() == contract_id)
        .cloned()
        .collect();
    for bucket in &map.prefix_rows {
        job.write(
            format!("{column}{}", bucket.row),
            sum_estimates(&contract_items, &bucket.prefix),
        );
    }

    let payment_items = result_rows(
        &r.gateway
            .call(
                &cost_endpoint(&record.project_id, "payment-items"),
                &[("filter[paymentId]".to_string(), payment_id.to_string())],
            )
            .await?,
    );
    let mobilization: f64 = payment_items
        .iter()
        .filter(|item| {
            item["number"]
                .as_str()
                .map(|n| map.mobilization_codes.iter().any(|code| code == n))
                .unwrap_or(false)
        })
        .filter_map(|item| number_field(&item["amount"]))
        .sum();
    job.write(format!("{column}{}", rows.mobilization), mobilization);

    if let Some(props) = payment["properties"].as_array() {
        for slot in &map.property_rows {
            let found = props.iter().find(|p| {
                p["name"]
                    .as_str()
                    .map(|n| n.contains(&slot.name_contains))
                    .unwrap_or(false)
            });
            if let Some(prop) = found {
                if let Some(n) = number_field(&prop["value"]) {
                    job.write(format!("{column}{}", slot.row), n);
                } else if let Some(s) = prop["value"].as_str() {
                    job.write(format!("{column}{}", slot.row), s);
                }
            }
        }
    }

    if let Some(reviewer_id) = payment["recipients"][0]["id"].as_str() {
        match r
            .gateway
            .call(&format!("construction/admin/v2/users/{reviewer_id}"), &[])
            .await
        {
            Ok(user) => {
                if let Some(name) = user["name"].as_str() {
                    job.write(map.reviewer_cell.clone(), name);
                }
            }
            Err(e) => log::warn!("could not resolve reviewer {reviewer_id}: {e}"),
        }
    }

    let pdf_path = r.execute(job).await?;
    Ok(RenderedArtifact {
        pdf_path,
        project_name: r.project_name(&record.project_id).await,
        category: "Cost Cover Sheets",
        filename: format!("{payment_id}.pdf"),
    })
}

/// The payment to cover: an explicit record id wins; otherwise the most
/// recent month (within the lookback window) that has a contract payment
/// ending in it.
pub(crate) fn select_payment<'a>(
    payments: &'a [Value],
    cost_id: Option<&str>,
    today: NaiveDate,
) -> Option<&'a Value> {
    let contract = |p: &&Value| p["associationType"].as_str() == Some("Contract");

    if let Some(cost_id) = cost_id {
        return payments.iter().filter(contract).find(|p| {
            p["id"].as_str() == Some(cost_id) || p["associationId"].as_str() == Some(cost_id)
        });
    }

    let mut cursor = today;
    for _ in 0..MONTH_LOOKBACK {
        let hit = payments.iter().filter(contract).find(|p| {
            parse_date(p["endDate"].as_str())
                .map(|d| d.year() == cursor.year() && d.month() == cursor.month())
                .unwrap_or(false)
        });
        if hit.is_some() {
            return hit;
        }
        cursor = previous_month(cursor);
    }
    None
}

pub(crate) fn sum_estimates(items: &[Value], prefix: &str) -> f64 {
    items
        .iter()
        .filter(|item| {
            item["number"]
                .as_str()
                .map(|n| n.starts_with(prefix))
                .unwrap_or(false)
        })
        .filter_map(|item| number_field(&item["estimated"]))
        .sum()
}

pub(crate) fn stage_column<'a>(map: &'a CellMap, status: Option<&str>, is_new: bool) -> &'a str {
    if is_new {
        return &map.stage_columns.draft;
    }
    match status {
        Some("revise") | Some("inReview") => &map.stage_columns.review,
        Some("accepted") | Some("approved") => &map.stage_columns.approved,
        _ => &map.stage_columns.draft,
    }
}

pub(crate) fn format_arabic_date(date: NaiveDate) -> String {
    format!(
        "{} {} {}",
        date.day(),
        ARABIC_MONTHS[date.month0() as usize],
        date.year()
    )
}

fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw?, "%Y-%m-%d").ok()
}

fn previous_month(cursor: NaiveDate) -> NaiveDate {
    let first = cursor.with_day(1).unwrap_or(cursor);
    first.pred_opt().unwrap_or(first)
}

/// Trailing digits of the payment number, without leading zeros.
fn payment_sequence(payment: &Value) -> Option<String> {
    if let Some(n) = payment["number"].as_i64() {
        return Some(n.to_string());
    }
    let number = payment["number"].as_str()?;
    let tail: Vec<char> = number
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if tail.is_empty() {
        return None;
    }
    let digits: String = tail.into_iter().rev().collect();
    let trimmed = digits.trim_start_matches('0');
    Some(if trimmed.is_empty() { "0".to_string() } else { trimmed.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn explicit_cost_id_wins_over_dates() {
        let payments = vec![
            json!({ "id": "p-1", "associationType": "Contract", "associationId": "c-1",
                    "endDate": "2026-08-31" }),
            json!({ "id": "p-2", "associationType": "Contract", "associationId": "c-2",
                    "endDate": "2026-07-31" }),
        ];
        let hit = select_payment(&payments, Some("c-2"), day(2026, 8, 28)).unwrap();
        assert_eq!(hit["id"], "p-2");
    }

    #[test]
    fn walks_back_to_the_most_recent_month_with_a_payment() {
        let payments = vec![
            json!({ "id": "stale", "associationType": "Contract", "endDate": "2026-05-31" }),
            json!({ "id": "other", "associationType": "Expense", "endDate": "2026-08-15" }),
        ];
        let hit = select_payment(&payments, None, day(2026, 8, 28)).unwrap();
        assert_eq!(hit["id"], "stale");
    }

    #[test]
    fn gives_up_outside_the_lookback_window() {
        let payments = vec![
            json!({ "id": "ancient", "associationType": "Contract", "endDate": "2019-01-31" }),
        ];
        assert!(select_payment(&payments, None, day(2026, 8, 28)).is_none());
    }

    #[test]
    fn prefix_sums_only_cover_matching_items() {
        let items = vec![
            json!({ "number": "NIC-001", "estimated": 100.0 }),
            json!({ "number": "NIC-002", "estimated": "250.5" }),
            json!({ "number": "SIC-001", "estimated": 40.0 }),
            json!({ "number": "NIC-003" }),
        ];
        assert_eq!(sum_estimates(&items, "NIC"), 350.5);
        assert_eq!(sum_estimates(&items, "SIC"), 40.0);
        assert_eq!(sum_estimates(&items, "REM"), 0.0);
    }

    #[test]
    fn stage_column_tracks_the_review_cycle() {
        let map = CellMap::default();
        assert_eq!(stage_column(&map, Some("approved"), true), "D");
        assert_eq!(stage_column(&map, None, false), "D");
        assert_eq!(stage_column(&map, Some("inReview"), false), "E");
        assert_eq!(stage_column(&map, Some("revise"), false), "E");
        assert_eq!(stage_column(&map, Some("accepted"), false), "F");
        assert_eq!(stage_column(&map, Some("approved"), false), "F");
    }

    #[test]
    fn dates_render_with_arabic_month_names() {
        assert_eq!(format_arabic_date(day(2026, 1, 5)), "5 يناير 2026");
        assert_eq!(format_arabic_date(day(2025, 12, 31)), "31 ديسمبر 2025");
    }

    #[test]
    fn sequence_is_the_trailing_digits_without_leading_zeros() {
        let seq = |v: Value| payment_sequence(&v);
        assert_eq!(seq(json!({ "number": "PC-007" })).as_deref(), Some("7"));
        assert_eq!(seq(json!({ "number": "12" })).as_deref(), Some("12"));
        assert_eq!(seq(json!({ "number": 3 })).as_deref(), Some("3"));
        assert_eq!(seq(json!({ "number": "draft" })), None);
        assert_eq!(seq(json!({})), None);
    }
}
