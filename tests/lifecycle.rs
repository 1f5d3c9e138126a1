use parking_lot::Mutex;
use roost::{
    impl_view, Backend, BaseView, Completion, Error, EventHandler, Host, MapLoader, MemoryBackend,
    Model, Patch, RenderStatus, Registry, Resource, ResourceKind, Setup, TemplateRef, View,
    ViewDeclaration, ViewId, ViewLoader, ViewOptions, ViewRef, Waiter,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use test_case::test_case;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn shared_backend(containers: &[&str]) -> Arc<Mutex<MemoryBackend>> {
    let mut backend = MemoryBackend::new();
    for container in containers {
        backend.add_container(container);
    }
    Arc::new(Mutex::new(backend))
}

/// Holds view creations until released by name, in any order.
#[derive(Clone, Default)]
struct DeferredViews {
    pending: Arc<Mutex<Vec<(String, Completion<Box<dyn View>>)>>>,
}

impl DeferredViews {
    fn release(&self, name: &str) {
        let done = {
            let mut pending = self.pending.lock();
            let pos = pending.iter().position(|(n, _)| n == name).expect("no such request");
            pending.remove(pos).1
        };
        done.ok(Box::new(BaseView));
    }
}

impl ViewLoader for DeferredViews {
    fn load(&self, name: &str, done: Completion<Box<dyn View>>) {
        self.pending.lock().push((name.to_string(), done));
    }
}

#[derive(Debug)]
struct CountsReady(Arc<Mutex<usize>>);

impl_view! {
    CountsReady;

    fn setup(&mut self, setup: &mut Setup) {
        let count = Arc::clone(&self.0);
        setup
            .events()
            .on("ready", EventHandler::new(move |_: &[Value]| *count.lock() += 1));
    }
}

#[derive(Debug)]
struct Waiting(Arc<Mutex<Vec<Waiter>>>);

impl_view! {
    Waiting;

    fn setup(&mut self, setup: &mut Setup) {
        let first = setup.wait_for();
        let second = setup.wait_for();
        self.0.lock().extend([first, second]);
    }
}

#[derive(Debug)]
struct CreatesChild;

impl_view! {
    CreatesChild;

    fn setup(&mut self, setup: &mut Setup) {
        setup.create_view("child", "A", ViewOptions::new(), true);
    }
}

fn declared(name: &str, view: &str) -> ViewDeclaration {
    ViewDeclaration {
        view: Some(ViewRef::Name(view.to_string())),
        ..ViewDeclaration::new(name)
    }
}

#[test]
fn ready_fires_exactly_once() {
    init_tracing();
    let count = Arc::new(Mutex::new(0));
    let registry = {
        let count = Arc::clone(&count);
        Registry::new().with("Counting", move || Box::new(CountsReady(Arc::clone(&count))))
    };
    let mut host = Host::builder().view_loader(Arc::new(registry)).build();

    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    let defs = json!({ "layout": [
        { "name": "a", "view": "View", "template": "a" },
        { "name": "b", "view": "View", "template": "b" },
    ] });
    host.create_view("Counting", ViewOptions::new().with_layout_defs(defs), move |_: &mut Host, id: ViewId| {
        *sink.lock() = Some(id)
    });
    host.poll().unwrap();

    let root = slot.lock().expect("root is ready");
    assert!(host.is_ready(root));
    for _ in 0..3 {
        host.check_ready(root);
    }
    assert_eq!(*count.lock(), 1);
}

#[test]
fn scenario_layout_loads_renders_and_skips() {
    init_tracing();
    #[derive(Debug)]
    struct Footer;
    impl_view! { Footer; }

    let loader = MapLoader::new()
        .with(
            ResourceKind::Layout,
            "header",
            Resource::Json(json!({ "type": "header", "layout": [] })),
        )
        .with_text(ResourceKind::LayoutTemplate, "header", "<h1>Header</h1>")
        .with_text(
            ResourceKind::LayoutTemplate,
            "default",
            "<% #each layout %><div data-view=\"<%= name %>\">{{{<%= name %>}}}</div><% /each %>",
        );
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder()
        .loader(Arc::new(loader))
        .view_loader(Arc::new(Registry::new().with("Footer", || Box::new(Footer))))
        .backend(Arc::clone(&backend))
        .build();

    let defs = json!({
        "type": "default",
        "layout": [
            { "name": "header", "layout": "header" },
            { "name": "main", "view": true },
            { "name": "footer", "view": "Footer", "notToRender": true },
        ]
    });
    let root = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new().with_layout_defs(defs).with_el("#root"),
        )
        .unwrap();
    assert!(!host.is_ready(root));
    host.poll().unwrap();

    assert!(host.is_ready(root));
    let keys: Vec<String> = host.views(root).into_iter().map(|(key, _)| key).collect();
    assert_eq!(keys, vec!["footer", "header"]);
    assert!(!host.has_view(root, "main"));
    assert!(host.declaration(root, "main").unwrap().is_placeholder());

    let header = host.get_view(root, "header").unwrap();
    let footer = host.get_view(root, "footer").unwrap();
    assert_eq!(host.selector(header), Some("#root [data-view=\"header\"]"));
    assert!(host.view::<Footer>(footer).is_some());

    host.render(root).unwrap();
    host.poll().unwrap();

    assert!(host.is_fully_rendered(root));
    assert!(host.is_rendered(header));
    assert!(!host.is_rendered(footer));
    assert_eq!(
        backend.lock().content("#root"),
        Some(
            "<div data-view=\"header\"><h1>Header</h1></div>\
             <div data-view=\"main\"></div>\
             <div data-view=\"footer\"></div>"
        )
    );
}

#[test_case(0, 1 ; "in order")]
#[test_case(1, 0 ; "reversed")]
fn waiters_hold_readiness_until_all_settle(first: usize, second: usize) {
    init_tracing();
    let waiters = Arc::new(Mutex::new(Vec::new()));
    let mut host = Host::builder().build();
    let id = host
        .add_view(Box::new(Waiting(Arc::clone(&waiters))), ViewOptions::new())
        .unwrap();
    assert!(!host.is_ready(id));

    let mut taken: Vec<Option<Waiter>> = waiters.lock().drain(..).map(Some).collect();
    taken[first].take().unwrap().settle();
    host.poll().unwrap();
    assert!(!host.is_ready(id));

    taken[second].take().unwrap().settle();
    host.poll().unwrap();
    assert!(host.is_ready(id));
}

#[test]
fn dropping_a_waiter_settles_it() {
    let waiters = Arc::new(Mutex::new(Vec::new()));
    let mut host = Host::builder().build();
    let id = host
        .add_view(Box::new(Waiting(Arc::clone(&waiters))), ViewOptions::new())
        .unwrap();
    waiters.lock().clear();
    host.poll().unwrap();
    assert!(host.is_ready(id));
}

#[test]
fn manual_wait_and_conditions_gate_readiness() {
    let mut host = Host::builder().build();
    let flag = Arc::new(Mutex::new(false));
    let id = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    assert!(host.is_ready(id));

    let other = {
        #[derive(Debug)]
        struct Manual;
        impl_view! {
            Manual;
            fn init(&mut self, setup: &mut Setup) {
                setup.wait(true);
            }
        }
        host.add_view(Box::new(Manual), ViewOptions::new()).unwrap()
    };
    assert!(!host.is_ready(other));

    let condition = Arc::clone(&flag);
    host.wait_until(other, move || *condition.lock());
    host.wait(other, false);
    assert!(!host.is_ready(other));

    *flag.lock() = true;
    host.check_ready(other);
    assert!(host.is_ready(other));
}

#[test]
fn set_view_removes_the_previous_occupant_first() {
    let mut host = Host::builder().build();
    let parent = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    let a = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    let b = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();

    host.set_view(parent, "slot", a, None);
    let removed = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&removed);
    host.events(a)
        .unwrap()
        .on("remove", EventHandler::new(move |_: &[Value]| *sink.lock() += 1));

    host.set_view(parent, "slot", b, None);
    assert_eq!(*removed.lock(), 1);
    assert!(host.is_removed(a));
    assert_eq!(host.get_view(parent, "slot"), Some(b));
    assert_eq!(host.parent(b), Some(parent));
    assert_eq!(host.key(b), Some("slot"));
}

#[test]
fn paths_follow_the_tree() {
    let mut host = Host::builder().build();
    let root = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    let main = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    let list = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();

    host.set_view(main, "list", list, None);
    host.set_view(root, "main", main, None);
    assert_eq!(host.path(root), Some(""));
    assert_eq!(host.path(list), Some("/main/list"));

    host.set_view(root, "content", main, None);
    assert!(!host.has_view(root, "main"));
    assert_eq!(host.path(list), Some("/content/list"));

    assert_eq!(host.unchain_view(root, "content"), Some(main));
    assert_eq!(host.path(list), Some("/list"));
    assert!(!host.is_removed(main));
}

#[test]
fn remove_is_idempotent() {
    let mut host = Host::builder().build();
    let root = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    let child = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    host.set_view(root, "child", child, None);

    host.remove(root, false);
    host.remove(root, false);
    assert!(host.is_removed(root));
    assert!(host.is_removed(child));
    assert!(!host.contains(root));
}

#[test_case("#main" ; "id")]
#[test_case(".list > li:first-child" ; "compound")]
#[test_case("[data-view=\"x\"]" ; "attribute")]
fn selector_round_trips(selector: &str) {
    let mut host = Host::builder().build();
    let id = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    host.set_selector(id, selector);
    assert_eq!(host.selector(id), Some(selector));
}

#[test]
fn siblings_attach_in_completion_order() {
    init_tracing();
    let views = DeferredViews::default();
    let mut host = Host::builder().view_loader(Arc::new(views.clone())).build();
    let defs = json!({ "layout": [
        { "name": "a", "view": "A", "template": "a" },
        { "name": "b", "view": "B", "template": "b" },
    ] });
    let root = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_layout_defs(defs))
        .unwrap();

    views.release("B");
    host.poll().unwrap();
    assert!(host.has_view(root, "b"));
    assert!(!host.has_view(root, "a"));
    assert!(!host.is_ready(root));

    views.release("A");
    host.poll().unwrap();
    assert!(host.has_view(root, "a"));
    assert!(host.is_ready(root));
}

#[test]
fn clearing_a_key_discards_the_late_view() {
    let views = DeferredViews::default();
    let mut host = Host::builder().view_loader(Arc::new(views.clone())).build();
    let root = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();

    assert!(host
        .create_nested_view(root, "late", "A", ViewOptions::new(), false)
        .is_some());
    host.clear_view(root, "late");
    views.release("A");
    host.poll().unwrap();
    assert!(!host.has_view(root, "late"));
}

#[test]
fn nested_views_created_during_setup_hold_readiness() {
    let views = DeferredViews::default();
    let mut host = Host::builder().view_loader(Arc::new(views.clone())).build();
    let root = host.add_view(Box::new(CreatesChild), ViewOptions::new()).unwrap();
    assert!(!host.is_ready(root));

    views.release("A");
    host.poll().unwrap();
    assert!(host.is_ready(root));
    let child = host.get_view(root, "child").unwrap();
    assert_eq!(host.path(child), Some("/child"));
    assert_eq!(host.selector(child), Some("[data-view=\"child\"]"));
}

#[test]
fn declared_views_receive_forwarded_options() {
    let mut host = Host::builder().build();
    let defs = json!({ "layout": [
        { "name": "a", "view": "View", "template": "t", "options": { "x": 1 } },
    ] });
    let model = Model::new(Map::new());
    let root = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new()
                .with_layout_defs(defs)
                .with_el("#root")
                .with_option("lang", json!("en"))
                .with_option("private", json!(true))
                .passing("lang")
                .with_model(model),
        )
        .unwrap();
    host.poll().unwrap();

    let child = host.get_view(root, "a").unwrap();
    let options = host.options(child).unwrap();
    assert_eq!(options.options.get("lang"), Some(&json!("en")));
    assert_eq!(options.options.get("x"), Some(&json!(1)));
    assert_eq!(options.options.get("private"), None);
    assert!(matches!(&options.template, Some(TemplateRef::Name(name)) if name == "t"));
    assert!(options.model.is_some());
    assert_eq!(host.selector(child), Some("#root [data-view=\"a\"]"));
}

#[test]
fn direct_views_win_over_layout_declarations() {
    let mut host = Host::builder().build();
    let defs = json!({ "layout": [{ "name": "a", "view": "View", "template": "from-layout" }] });
    let direct = ViewDeclaration {
        template: Some("direct".into()),
        ..declared("a", "View")
    };
    let root = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new().with_layout_defs(defs).with_view("a", direct),
        )
        .unwrap();
    host.poll().unwrap();

    let child = host.get_view(root, "a").unwrap();
    assert!(matches!(
        &host.options(child).unwrap().template,
        Some(TemplateRef::Name(name)) if name == "direct"
    ));
}

#[test]
fn canceled_renders_leave_the_document_alone() {
    init_tracing();
    let loader = MapLoader::new().with_text(ResourceKind::Template, "slow", "<p>x</p>");
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder()
        .loader(Arc::new(loader))
        .backend(Arc::clone(&backend))
        .build();
    let id = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_template("slow").with_el("#root"))
        .unwrap();

    host.render(id).unwrap();
    assert!(host.is_being_rendered(id));
    host.cancel_render(id);
    host.poll().unwrap();
    assert_eq!(backend.lock().content("#root"), None);
    assert!(!host.is_rendered(id));
    assert!(!host.is_being_rendered(id));

    // cached now, so this one completes right away
    host.render(id).unwrap();
    assert_eq!(backend.lock().content("#root"), Some("<p>x</p>"));
    assert!(host.is_fully_rendered(id));
}

#[test]
fn re_render_during_a_render_runs_after_it() {
    let loader = MapLoader::new().with_text(ResourceKind::Template, "slow", "<p>x</p>");
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder()
        .loader(Arc::new(loader))
        .backend(Arc::clone(&backend))
        .build();
    let id = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_template("slow").with_el("#root"))
        .unwrap();

    let called = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&called);
    host.render(id).unwrap();
    let status = host
        .re_render_with(id, false, move |_: &mut Host, _: ViewId| *sink.lock() += 1)
        .unwrap();
    assert_eq!(status, RenderStatus::Deferred);

    host.poll().unwrap();
    assert_eq!(*called.lock(), 1);
    assert_eq!(backend.lock().patches().count(), 2);
}

#[test]
fn re_render_without_force_skips_unrendered_views() {
    let mut host = Host::builder().build();
    let id = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_template_content("x"))
        .unwrap();

    let called = Arc::new(Mutex::new(false));
    let sink = Arc::clone(&called);
    let status = host
        .re_render_with(id, false, move |_: &mut Host, _: ViewId| *sink.lock() = true)
        .unwrap();
    assert_eq!(status, RenderStatus::Skipped);
    assert!(!*called.lock());

    assert_eq!(host.re_render(id, true).unwrap(), RenderStatus::Started);
    assert!(host.is_rendered(id));
}

#[test]
fn components_replace_their_element() {
    let backend = shared_backend(&["#item"]);
    let mut host = Host::builder().backend(Arc::clone(&backend)).build();
    let id = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new()
                .with_template_content("<li class=\"row\">{{title}}</li>")
                .with_el("#item")
                .component(),
        )
        .unwrap();

    host.render(id).unwrap();
    let cid = id.cid();
    let selector = format!("[data-view-cid=\"{}\"]", cid);
    assert_eq!(host.selector(id), Some(selector.as_str()));
    let backend = backend.lock();
    assert!(!backend.contains("#item"));
    assert_eq!(
        backend.content(&selector),
        Some(format!("<li data-view-cid=\"{}\" class=\"row\"></li>", cid).as_str())
    );
}

#[test]
fn components_with_two_roots_are_not_mounted() {
    let backend = shared_backend(&["#item"]);
    let mut host = Host::builder().backend(Arc::clone(&backend)).build();
    let id = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new()
                .with_template_content("<p>a</p><p>b</p>")
                .with_el("#item")
                .component(),
        )
        .unwrap();

    host.render(id).unwrap();
    assert!(host.is_rendered(id));
    assert_eq!(host.selector(id), Some("#item"));
    let mut backend = backend.lock();
    assert!(backend.contains("#item"));
    assert_eq!(backend.patches().count(), 0);
}

#[test]
fn removing_empties_the_element() {
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder().backend(Arc::clone(&backend)).build();
    let id = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new().with_template_content("<p>x</p>").with_el("#root"),
        )
        .unwrap();
    host.render(id).unwrap();
    host.remove(id, false);

    let mut backend = backend.lock();
    assert_eq!(backend.content("#root"), Some(""));
    let patches: Vec<Patch> = backend.patches().collect();
    assert_eq!(
        patches.last(),
        Some(&Patch::Empty {
            selector: "#root".into()
        })
    );
}

#[test]
fn render_data_includes_the_model() {
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder().backend(Arc::clone(&backend)).build();
    let mut attributes = Map::new();
    attributes.insert("title".into(), json!("Hi & bye"));
    let id = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new()
                .with_template_content("<h1>{{model.title}}</h1>")
                .with_el("#root")
                .with_model(Model::new(attributes)),
        )
        .unwrap();
    host.render(id).unwrap();
    assert_eq!(backend.lock().content("#root"), Some("<h1>Hi &amp; bye</h1>"));
}

#[test]
fn failing_nested_views_contribute_nothing() {
    init_tracing();
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder().backend(Arc::clone(&backend)).build();
    let root = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new()
                .with_template_content("[{{{a}}}]")
                .with_el("#root")
                .with_view("a", declared("a", "View")),
        )
        .unwrap();
    host.poll().unwrap();
    assert!(host.has_view(root, "a"));

    host.render(root).unwrap();
    assert_eq!(backend.lock().content("#root"), Some("[]"));
}

#[test]
fn views_without_a_template_fail_to_render() {
    let mut host = Host::builder().build();
    let id = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_el("#root"))
        .unwrap();
    assert!(matches!(host.render(id), Err(Error::Configuration(_))));
    assert!(!host.is_being_rendered(id));
}

#[test]
fn unknown_views_fail_the_poll_and_stall_the_parent() {
    let mut host = Host::builder().build();
    let defs = json!({ "layout": [{ "name": "a", "view": "Missing" }] });
    let root = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_layout_defs(defs))
        .unwrap();
    assert!(matches!(host.poll(), Err(Error::NotFound(_))));
    assert!(!host.is_ready(root));
}

#[test]
fn listeners_are_dropped_on_removal() {
    let mut host = Host::builder().build();
    let id = host.add_view(Box::new(BaseView), ViewOptions::new()).unwrap();
    let model = Model::new(Map::new());
    let changes = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&changes);
    host.listen_to(
        id,
        model.events(),
        "change",
        EventHandler::new(move |_: &[Value]| *sink.lock() += 1),
    );

    model.set("a", json!(1));
    host.remove(id, true);
    model.set("a", json!(2));
    assert_eq!(*changes.lock(), 1);
}

fn with_nested_template(options: ViewOptions) -> ViewOptions {
    let nested = ViewDeclaration {
        template: Some("a".into()),
        ..declared("a", "View")
    };
    options.with_el("#root").with_view("a", nested)
}

#[test]
fn canceled_renders_release_nested_views() {
    init_tracing();
    let loader = MapLoader::new()
        .with_text(ResourceKind::Template, "slow", "<p>{{{a}}}</p>")
        .with_text(ResourceKind::Template, "a", "<i>a</i>");
    let backend = shared_backend(&["#root"]);
    let mut host = Host::builder()
        .loader(Arc::new(loader))
        .backend(Arc::clone(&backend))
        .build();
    let root = host
        .add_view(Box::new(BaseView), with_nested_template(ViewOptions::new().with_template("slow")))
        .unwrap();
    host.poll().unwrap();
    let child = host.get_view(root, "a").unwrap();

    host.render(root).unwrap();
    assert!(host.is_being_rendered(child));
    assert_eq!(host.re_render(child, false).unwrap(), RenderStatus::Deferred);
    host.cancel_render(root);
    host.poll().unwrap();

    assert!(!host.is_being_rendered(root));
    assert!(!host.is_being_rendered(child));
    assert!(!host.is_rendered(child));
    assert_eq!(host.re_render(child, false).unwrap(), RenderStatus::Skipped);
    assert_eq!(backend.lock().patches().count(), 0);

    // both templates are cached now
    host.render(root).unwrap();
    assert!(host.is_rendered(child));
    assert_eq!(backend.lock().content("#root"), Some("<p><i>a</i></p>"));
}

#[test]
fn failed_root_renders_release_nested_views() {
    let loader = MapLoader::new().with_text(ResourceKind::Template, "a", "<i>a</i>");
    let mut host = Host::builder().loader(Arc::new(loader)).build();
    let root = host
        .add_view(Box::new(BaseView), with_nested_template(ViewOptions::new()))
        .unwrap();
    host.poll().unwrap();
    let child = host.get_view(root, "a").unwrap();

    host.render(root).unwrap();
    assert!(matches!(host.poll(), Err(Error::Configuration(_))));
    assert!(!host.is_being_rendered(root));
    assert!(!host.is_being_rendered(child));
    assert_eq!(host.re_render(child, false).unwrap(), RenderStatus::Skipped);
}

#[test]
fn assigned_views_attach_once_ready() {
    let waiters = Arc::new(Mutex::new(Vec::new()));
    let mut host = Host::builder().build();
    let root = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_el("#root"))
        .unwrap();

    let side = host
        .assign_view(
            root,
            "side",
            Box::new(Waiting(Arc::clone(&waiters))),
            ViewOptions::new(),
            Some("#side"),
        )
        .unwrap()
        .unwrap();
    assert!(!host.has_view(root, "side"));
    assert!(host.view::<Waiting>(side).is_some());

    waiters.lock().clear();
    host.poll().unwrap();
    assert_eq!(host.get_view(root, "side"), Some(side));
    assert_eq!(host.path(side), Some("/side"));
    assert_eq!(host.selector(side), Some("#side"));
}

#[test]
fn disabled_declarations_count_as_loaded() {
    let views = DeferredViews::default();
    let mut host = Host::builder().view_loader(Arc::new(views.clone())).build();
    let defs = json!({ "layout": [{ "name": "off", "view": false, "template": "t" }] });
    let root = host
        .add_view(Box::new(BaseView), ViewOptions::new().with_layout_defs(defs))
        .unwrap();

    assert!(host.is_ready(root));
    assert!(views.pending.lock().is_empty());
    assert!(!host.has_view(root, "off"));
    assert!(host.declaration(root, "off").unwrap().is_disabled());
}

#[test]
fn unchained_views_can_be_set_elsewhere() {
    let mut host = Host::builder().build();
    let defs = json!({ "layout": [
        { "name": "main", "view": "View", "template": "t" },
        { "name": "side", "view": true },
    ] });
    let root = host
        .add_view(
            Box::new(BaseView),
            ViewOptions::new().with_layout_defs(defs).with_el("#root"),
        )
        .unwrap();
    host.poll().unwrap();
    let main = host.get_view(root, "main").unwrap();
    assert_eq!(host.selector(main), Some("#root [data-view=\"main\"]"));

    assert_eq!(host.unchain_view(root, "main"), Some(main));
    assert!(!host.has_view(root, "main"));
    assert_eq!(host.parent(main), None);
    assert_eq!(host.path(main), Some(""));

    host.set_view(root, "side", main, None);
    assert!(!host.is_removed(main));
    assert_eq!(host.get_view(root, "side"), Some(main));
    assert_eq!(host.path(main), Some("/side"));
    assert_eq!(host.selector(main), Some("#root [data-view=\"side\"]"));
}

#[test]
fn waiting_with_a_callback_after_setup() {
    #[derive(Debug)]
    struct Held;
    impl_view! {
        Held;
        fn init(&mut self, setup: &mut Setup) {
            setup.wait(true);
        }
    }

    let mut host = Host::builder().build();
    let id = host.add_view(Box::new(Held), ViewOptions::new()).unwrap();
    let slot = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&slot);
    host.wait_with(id, move |waiter: Waiter| *sink.lock() = Some(waiter));
    host.wait(id, false);
    assert!(!host.is_ready(id));

    slot.lock().take().unwrap().settle();
    host.poll().unwrap();
    assert!(host.is_ready(id));
}
