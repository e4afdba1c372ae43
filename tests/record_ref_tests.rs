use sitedocs_server::render::{RecordRef, RenderError, Section};

const PROJECT: &str = "4e0258bd-9d53-4b03-a1b2-c3d4e5f60789";
const COST: &str = "7f3a1c22-0b4d-4e5f-8a9b-0c1d2e3f4a5b";

#[test]
fn budget_page_url_parses() {
    let url = format!("https://acc.example.com/projects/{PROJECT}/budget-management");
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.project_id, PROJECT);
    assert_eq!(record.section, Section::Budgets);
    assert_eq!(record.cost_id, None);
}

#[test]
fn forms_page_url_parses() {
    let url = format!("https://acc.example.com/projects/{PROJECT}/forms");
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.section, Section::Forms);
}

#[test]
fn cost_page_without_a_selection_has_no_cost_id() {
    let url = format!("https://acc.example.com/projects/{PROJECT}/cost/cost-management");
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.section, Section::Costs);
    assert_eq!(record.cost_id, None);
}

#[test]
fn cost_id_comes_from_the_preview_parameter() {
    let url = format!(
        "https://acc.example.com/projects/{PROJECT}/cost/cost-management?preview={COST}&tab=payments"
    );
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.cost_id.as_deref(), Some(COST));
}

#[test]
fn cost_id_comes_from_the_select_id_parameter() {
    let url = format!(
        "https://acc.example.com/projects/{PROJECT}/cost/cost-management?selectId={COST}"
    );
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.cost_id.as_deref(), Some(COST));
}

#[test]
fn cost_id_comes_from_a_trailing_path_segment() {
    let url = format!("https://acc.example.com/projects/{PROJECT}/cost/cost-management/{COST}");
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.cost_id.as_deref(), Some(COST));
}

#[test]
fn the_project_id_segment_is_not_mistaken_for_a_cost_id() {
    // Ends with the project id, which must not be picked up as a selection.
    let url = format!("https://acc.example.com/cost/cost-management/projects/{PROJECT}");
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.cost_id, None);
}

#[test]
fn non_uuid_query_values_are_ignored() {
    let url = format!(
        "https://acc.example.com/projects/{PROJECT}/cost/cost-management?preview=not-a-record-id"
    );
    let record = RecordRef::parse(&url).unwrap();
    assert_eq!(record.cost_id, None);
}

#[test]
fn url_without_a_project_id_is_rejected() {
    let err = RecordRef::parse("https://acc.example.com/cost/cost-management").unwrap_err();
    assert!(matches!(err, RenderError::NoProjectId));
}

#[test]
fn url_pointing_at_an_unknown_section_is_rejected() {
    let url = format!("https://acc.example.com/projects/{PROJECT}/schedule");
    let err = RecordRef::parse(&url).unwrap_err();
    assert!(matches!(err, RenderError::UnknownSection));
}
