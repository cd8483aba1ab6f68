use formbind::form::{
    Control, ControlSpec, EventLog, FieldKind, Form, FormContext, FormEvent, MemoryDocument,
    SubmissionRequest, SyncDirection,
};
use formbind::transport::StaticTransport;
use formbind::validation::{FieldSelection, StandardTests, ValidationContext};
use formbind::widget::{ListWidget, Widget, WidgetConfig};
use formbind::{FormConfig, FormHost};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::rc::Rc;

fn form() -> (Form, Rc<MemoryDocument>, EventLog) {
    let doc = Rc::new(MemoryDocument::new());
    let ctx = FormContext::new(FormConfig::default());
    let log = EventLog::new();
    ctx.register_handler(Box::new(log.clone()));
    let provider = Rc::new(StandardTests::new(doc.clone()));
    (Form::new(ctx, doc.clone(), provider), doc, log)
}

fn shelves() -> ListWidget {
    ListWidget::standard(
        WidgetConfig::from_value(json!({
            "id": "shelves",
            "base-field": "shelves",
            "sub-fields": {"base-field": "books"},
            "child-config": {
                "base-field": "books",
                "sub-fields": {"field": "title"},
                "child-config": {"field": "title"}
            }
        }))
        .expect("config should parse"),
    )
}

fn load(form: &mut Form, data: Value) {
    form.merge_server_data(data).expect("should merge");
    form.synch(SyncDirection::Load, None);
}

#[test]
fn text_value_reaches_server_data() {
    let (mut form, doc, _) = form();
    doc.add(ControlSpec::text("email"));
    form.add_field("email", None).expect("should add");

    assert_eq!(form.set_value("email", "a@b.com"), Some(json!("a@b.com")));
    form.synch(SyncDirection::Save, None);

    assert_eq!(form.server_value("email"), Some(&json!("a@b.com")));
}

#[test]
fn early_server_data_is_adopted_by_late_field() {
    let (mut form, doc, log) = form();
    load(&mut form, json!({"phone": "555"}));
    assert!(form.has_unmanaged_data());

    doc.add(ControlSpec::text("phone"));
    form.add_field("phone", None).expect("should add");
    form.synch(SyncDirection::Save, Some("phone"));

    assert!(!form.has_unmanaged_data());
    assert_eq!(form.value("phone"), Some(json!("555")));
    assert_eq!(
        log.count(|e| matches!(e, FormEvent::NewManagedServerData { .. })),
        1
    );
}

#[test]
fn unchecking_unchecked_box_is_silent() {
    let (mut form, doc, log) = form();
    doc.add(ControlSpec::checkbox("agree", "yes"));
    form.add_field("agree", None).expect("should add");
    log.clear();

    assert_eq!(form.set_value("agree", false), Some(json!(false)));
    assert!(log.events().is_empty());
}

#[test]
fn re_adding_a_field_restores_its_kind() {
    let (mut form, doc, _) = form();
    doc.add(ControlSpec::checkbox("agree", "yes").checked(true));
    form.add_field("agree", None).expect("should add");

    form.ignore_field("agree", false).expect("should ignore");
    assert!(form.server_value("agree").is_none());
    form.add_field("agree", None).expect("should re-add");

    assert_eq!(form.registry().kind("agree"), Some(FieldKind::Checkbox));
    assert_eq!(form.server_value("agree"), Some(&json!("yes")));
}

#[test]
fn save_rules_for_a_field_list_are_anded() {
    let (mut form, doc, log) = form();
    doc.add(ControlSpec::text("a").with_value("x"));
    let b = doc.add(ControlSpec::text("b"));
    doc.add(ControlSpec::text("c"));
    for id in ["a", "b", "c"] {
        form.add_field(id, None).expect("should add");
    }
    form.validation_mut()
        .set_save_rules("a", &["required"], None, None)
        .expect("rules should attach");
    form.validation_mut()
        .set_save_rules("b", &["required", "integer"], None, None)
        .expect("rules should attach");
    log.clear();

    let validation = form.validation_mut();
    assert!(!validation.test(ValidationContext::Save, FieldSelection::Many(&["a", "b"])));
    assert!(validation.test(ValidationContext::Save, FieldSelection::Many(&["a", "c"])));
    b.set_value("12");
    assert!(validation.test(ValidationContext::Save, FieldSelection::Many(&["a", "b"])));
    assert!(log.events().is_empty());
}

#[test]
fn reordering_outer_list_leaves_nested_indices_alone() {
    let (mut form, _, _) = form();
    load(
        &mut form,
        json!({
            "shelves.1.books.1.title": "Dune",
            "shelves.1.books.2.title": "Emma",
            "shelves.2.books.1.title": "Ulysses"
        }),
    );
    let mut list = shelves();
    list.build_ui(&mut form).expect("should build");
    assert_eq!(list.child_count(), 2);
    assert!(!form.has_unmanaged_data());

    list.reorder(&mut form, &[2, 1]).expect("should reorder");

    assert_eq!(list.child_count(), 2);
    assert_eq!(form.value("shelves.1.books.1.title"), Some(json!("Ulysses")));
    assert_eq!(form.value("shelves.2.books.1.title"), Some(json!("Dune")));
    assert_eq!(form.value("shelves.2.books.2.title"), Some(json!("Emma")));
    assert!(!form.has_field("shelves.1.books.2.title"));
    assert_eq!(form.server_data().len(), 3);
    assert_eq!(
        list.child_by_index(1).map(|w| w.id().to_string()),
        Some("shelves.1.booksContainer".to_string())
    );
}

#[test]
fn deleting_a_row_closes_the_gap() {
    let (mut form, doc, _) = form();
    load(
        &mut form,
        json!({
            "shelves.1.books.1.title": "Dune",
            "shelves.2.books.1.title": "Ulysses",
            "shelves.2.books.2.title": "Emma"
        }),
    );
    let mut list = shelves();
    list.build_ui(&mut form).expect("should build");

    list.delete_child(&mut form, 1).expect("should delete");

    assert_eq!(list.child_count(), 1);
    assert_eq!(
        list.fields(),
        vec!["shelves.1.books.1.title", "shelves.1.books.2.title"]
    );
    assert_eq!(form.value("shelves.1.books.2.title"), Some(json!("Emma")));
    assert!(form.server_value("shelves.2.books.1.title").is_none());
    assert_eq!(doc.len(), 2);
}

#[tokio::test]
async fn host_startup_then_submit() {
    let transport = StaticTransport::new().with_json(
        "/book.json",
        json!({"title": "Dune", "shelves.1.books.1.title": "Dune", "isbn": "0441013597"}),
    );
    let config: FormConfig =
        serde_json::from_value(json!({"urlDataSource": "/book.json", "debuggingEnabled": false}))
            .expect("config should parse");
    let doc = Rc::new(MemoryDocument::new());
    doc.add(ControlSpec::text("title").with_class("bound-field"));
    let provider = Rc::new(StandardTests::new(doc.clone()));
    let mut host = FormHost::new(config, doc, provider, Rc::new(transport));

    let sent = Rc::new(RefCell::new(Vec::new()));
    let sink = sent.clone();
    host.form_mut().hooks_mut().submit_data =
        Some(Box::new(move |request: &SubmissionRequest<'_>| {
            sink.borrow_mut().push(request.data.clone());
            Ok(())
        }));

    host.start(vec![Box::new(shelves())])
        .await
        .expect("startup should succeed");

    assert!(host.form().is_unmanaged("isbn"));
    assert!(!host.submit());

    host.form_mut().hooks_mut().pre_submit =
        Some(Box::new(|request: &SubmissionRequest<'_>| Ok(Some(request.valid))));
    host.set_value("shelves.1.books.1.title", "Dune Messiah");
    assert!(host.submit());

    let sent = sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].get("shelves.1.books.1.title"),
        Some(&json!("Dune Messiah"))
    );
    assert_eq!(sent[0].get("isbn"), Some(&json!("0441013597")));
}
