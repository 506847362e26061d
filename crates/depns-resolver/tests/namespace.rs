use std::cell::RefCell;
use std::rc::Rc;

use depns_core::coordinate::Artifact;
use depns_resolver::{
    ArtifactNamespace, Entry, NamespaceKey, NamespaceRegistry, ProjectScope, Value,
};
use depns_util::errors::DepnsError;

fn specs(reqs: &[depns_resolver::ArtifactRequirement]) -> Vec<String> {
    reqs.iter().map(|r| r.to_spec()).collect()
}

// ── parent ──────────────────────────────────────────────────────────────

#[test]
fn root_has_no_parent_and_refuses_one() {
    let reg = NamespaceRegistry::new();
    assert!(reg.root().parent().is_none());
    let err = reg.root().set_parent("foo").unwrap_err();
    assert!(matches!(err, DepnsError::Immutability { .. }));
    assert!(err.to_string().contains("Cannot set parent"), "got: {err}");
}

#[test]
fn parent_can_be_set_by_name_or_handle() {
    let reg = NamespaceRegistry::new();
    let bar = reg.instance("bar");
    bar.set_parent("foo").unwrap();
    assert_eq!(bar.parent(), Some(reg.instance("foo")));

    let baz = reg.instance("baz");
    bar.set_parent(&baz).unwrap();
    assert_eq!(bar.parent(), Some(baz));
}

#[test]
fn only_the_registry_root_is_root() {
    let reg = NamespaceRegistry::new();
    assert!(reg.root().is_root());
    assert!(reg.instance("root").is_root());
    assert!(!reg.instance("foo").is_root());

    let imposter = ArtifactNamespace::detached("root");
    assert!(!imposter.is_root());
    let outer = ArtifactNamespace::detached("outer");
    imposter.set_parent(&outer).unwrap();
    assert_eq!(imposter.parent(), Some(outer));
}

#[test]
fn parent_cycles_are_rejected() {
    let reg = NamespaceRegistry::new();
    let foo = reg.instance("foo");
    assert!(matches!(
        foo.set_parent("foo"),
        Err(DepnsError::Immutability { .. })
    ));
    assert!(matches!(
        foo.set_parent("foo:bar"),
        Err(DepnsError::Immutability { .. })
    ));
    assert_eq!(foo.parent(), Some(reg.root()));
}

#[test]
fn nested_names_imply_parents() {
    let reg = NamespaceRegistry::new();
    let c = reg.instance("A::B::C");
    assert_eq!(c.name(), "A:B:C");
    assert_eq!(c.parent(), Some(reg.instance("A::B")));
    assert_eq!(reg.instance("A::B").parent(), Some(reg.instance("A")));
    assert_eq!(reg.instance("A").parent(), Some(reg.root()));
    assert_eq!(reg.instance(["foo", "bar", "baz"]).name(), "foo:bar:baz");
}

struct Addon;

#[test]
fn type_keys_use_the_module_path() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance(NamespaceKey::of::<Addon>());
    assert!(ns.name().ends_with(":Addon"), "got: {}", ns.name());
    assert!(!ns.name().contains("::"));
}

#[test]
fn parent_can_follow_the_current_scope() {
    let scope = ProjectScope::new();
    let reg = NamespaceRegistry::with_scope(scope.clone());
    let module = reg.instance("A::B");
    module.set_parent(NamespaceKey::Current).unwrap();

    assert_eq!(module.parent(), Some(reg.root()));
    scope.within("a", || {
        assert_eq!(module.parent(), Some(reg.instance("a")));
        scope.within("b", || {
            assert_eq!(module.parent(), Some(reg.instance("a:b")));
        });
    });
}

#[test]
fn current_scope_inside_the_namespace_is_not_a_parent() {
    let scope = ProjectScope::new();
    let reg = NamespaceRegistry::with_scope(scope.clone());
    let module = reg.instance("A:B");
    module.set_parent(NamespaceKey::Current).unwrap();
    scope.within("A", || {
        scope.within("B", || {
            scope.within("C", || assert!(module.parent().is_none()));
        });
    });
}

// ── need ────────────────────────────────────────────────────────────────

#[test]
fn need_accepts_an_artifact_spec() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need("a:b:c:1").unwrap();

    assert!(!ns.requirement("a:b:c").unwrap().is_selected());
    let b = ns.requirement("b").unwrap();
    assert!(!b.is_selected());
    assert!(b.satisfied_by("a:b:c:1").unwrap());
    assert!(!b.satisfied_by("a:b:c:2").unwrap());
    assert!(!b.satisfied_by("d:b:c:1").unwrap());
    assert_eq!(b.version().as_deref(), Some("1"));
}

#[test]
fn need_accepts_a_classifier() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need("a:b:c:d:1").unwrap();

    assert!(!ns.requirement("a:b:c:d:").unwrap().is_selected());
    let b = ns.requirement("b").unwrap();
    assert!(b.satisfied_by("a:b:c:d:1").unwrap());
    assert!(!b.satisfied_by("a:b:c:d:2").unwrap());
    assert!(!b.satisfied_by("d:b:c:d:1").unwrap());
    assert_eq!(b.version().as_deref(), Some("1"));
}

#[test]
fn need_accepts_a_requirement_spec() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need("thing -> a:b:c:2.1 -> ~>2.0").unwrap();

    assert!(!ns.requirement("a:b:c").unwrap().is_selected());
    assert!(!ns.contains_key("b"));
    let thing = ns.requirement("thing").unwrap();
    assert!(!thing.is_selected());
    assert!(thing.satisfied_by("a:b:c:2.5").unwrap());
    assert!(!thing.satisfied_by("a:b:c:3").unwrap());
    assert_eq!(thing.version().as_deref(), Some("2.1"));
}

#[test]
fn need_as_accepts_requirement_specs() {
    let reg = NamespaceRegistry::new();
    let one = reg.instance("one");
    one.need_as("thing", "a:b:c:2.1 -> ~>2.0").unwrap();
    let thing = one.requirement("thing").unwrap();
    assert!(thing.satisfied_by("a:b:c:2.5").unwrap());
    assert!(!thing.satisfied_by("a:b:c:3").unwrap());
    assert_eq!(thing.version().as_deref(), Some("2.1"));

    let two = reg.instance("two");
    two.need_as("thing", "a:b:c:(~>2.0 | 2.1)").unwrap();
    let thing = two.requirement("thing").unwrap();
    assert!(thing.satisfied_by("a:b:c:2.5").unwrap());
    assert!(!thing.satisfied_by("a:b:c:3").unwrap());
    assert_eq!(thing.version().as_deref(), Some("2.1"));
}

#[test]
fn need_as_accepts_a_group() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need_as("things", ["foo:bar:jar:1.0", "foo:baz:jar:2.0"])
        .unwrap();

    assert!(!ns.requirement("foo:bar:jar").unwrap().is_selected());
    assert!(!ns.requirement("foo:baz:jar").unwrap().is_selected());
    assert!(ns.get_many(&["bar", "baz"]).iter().all(Option::is_none));

    let unversioned: Vec<String> = ns
        .requirement("things")
        .unwrap()
        .members()
        .iter()
        .filter_map(|m| m.unversioned_spec())
        .collect();
    assert_eq!(unversioned, vec!["foo:bar:jar", "foo:baz:jar"]);

    let baz = ns.alias("baz", "foo:baz:jar").unwrap();
    assert!(baz.ptr_eq(&ns.requirement("foo:baz:jar").unwrap()));
    assert!(ns.requirement("baz").unwrap().ptr_eq(&baz));
}

#[test]
fn need_inherits_a_satisfying_ancestor_selection() {
    let reg = NamespaceRegistry::new();
    let a = reg.instance("a");
    a.set("a", "foo:bar:jar:1.5").unwrap();
    a.set("b", "foo:baz:jar:2.0").unwrap();

    let b = reg.instance("a:b");
    assert!(b.requirement("a").unwrap().requirement().is_none());
    assert!(b.requirement("a").unwrap().is_selected());

    b.need_as("c", "foo:bat:jar:3.0").unwrap();
    assert!(!b.requirement("foo:bat:jar").unwrap().is_selected());
    assert!(!b.requirement("c").unwrap().is_selected());

    b.need_as("one", "foo:bar:jar:>=1.0").unwrap();
    let one = b.requirement("one").unwrap();
    assert_eq!(one.version().as_deref(), Some("1.5"));
    assert!(one.is_selected());
    assert!(b.requirement("a").unwrap().requirement().is_none());

    b.need_as("two", "foo:baz:jar:>2").unwrap();
    let two = b.requirement("two").unwrap();
    assert_eq!(two.version(), None);
    assert!(!two.is_selected());
    assert!(b.requirement("b").unwrap().requirement().is_none());
}

#[test]
fn mismatched_ancestor_selection_clears_the_default() {
    let reg = NamespaceRegistry::new();
    reg.instance("a").set("lib", "g:lib:jar:2.0").unwrap();
    let child = reg.instance("a:b");
    child.need_as("lib", "g:lib:jar:3.0").unwrap();
    let lib = child.requirement("lib").unwrap();
    assert_eq!(lib.version(), None);
    assert!(!lib.is_selected());

    child.set("lib", "3.0").unwrap();
    assert_eq!(lib.version().as_deref(), Some("3.0"));
}

#[test]
fn require_declares_a_default_with_a_constraint() {
    let reg = NamespaceRegistry::new();
    let foo = reg.instance("foo");
    let cool = foo.require("cool_aid", "cool:aid:jar:2", None).unwrap();
    assert_eq!(cool.version().as_deref(), Some("2"));
    assert!(!cool.is_selected());

    let bar = reg.instance("foo:bar");
    bar.require("cool_aid", "cool:aid:man:3", Some(">2")).unwrap();
    let cool = bar.requirement("cool_aid").unwrap();
    assert_eq!(cool.version().as_deref(), Some("3"));
    assert!(cool.requirement().unwrap().satisfied_by("2.5").unwrap());
    assert!(!cool.is_selected());
}

#[test]
fn has_requires_a_selection() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    ns.need_as("cool_aid", "cool:aid:jar:>1").unwrap();
    assert!(!ns.has("cool_aid"));
    assert!(!ns.has("unknown"));
    ns.set("cool_aid", "2").unwrap();
    assert!(ns.has("cool_aid"));
    assert!(ns.is_satisfied("cool_aid"));
}

// ── use ─────────────────────────────────────────────────────────────────

#[test]
fn use_registers_and_copies() {
    let reg = NamespaceRegistry::new();
    let one = reg.instance("one");
    one.set("thing", "a:b:c:1").unwrap();
    let thing = one.requirement("thing").unwrap();
    assert!(thing.requirement().is_none());
    assert_eq!(thing.version().as_deref(), Some("1"));
    assert_eq!(thing.id().as_deref(), Some("b"));

    let nested = reg.instance("one:one");
    nested.set("thing", "a:d:c:2").unwrap();
    let local = nested.requirement("thing").unwrap();
    assert_eq!(local.version().as_deref(), Some("2"));
    assert_eq!(local.id().as_deref(), Some("d"));

    let parent_thing = nested.parent().unwrap().requirement("thing").unwrap();
    nested.set("copied", &parent_thing).unwrap();
    let copied = nested.requirement("copied").unwrap();
    assert_ne!(copied, parent_thing);
    assert!(copied.requirement().is_none());
    assert_eq!(copied.version().as_deref(), Some("1"));
    assert_eq!(copied.id().as_deref(), Some("b"));

    nested.set("aliased", Value::key("copied")).unwrap();
    assert_eq!(
        nested.requirement("aliased").unwrap().to_spec(),
        copied.to_spec()
    );

    let err = nested.set("invalid", Value::key("unknown")).unwrap_err();
    assert!(matches!(err, DepnsError::Lookup { .. }));
    assert!(err.to_string().contains("undefined"), "got: {err}");

    assert!(one.requirement("copied").is_none());
}

#[test]
fn unversioned_spec_references_the_latest_registration() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.set("foo", "a:b:c:1").unwrap();
    ns.set("bar", "a:b:c:2").unwrap();
    assert_eq!(ns.requirement("foo").unwrap().version().as_deref(), Some("1"));
    assert_eq!(ns.requirement("bar").unwrap().version().as_deref(), Some("2"));
    assert_eq!(ns.requirement("a:b:c").unwrap().version().as_deref(), Some("2"));
}

#[test]
fn use_enforces_the_declared_requirement() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need_as("bar", "foo:bar:baz:~>1.5").unwrap();

    let err = ns.set("bar", "1.4").unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    assert!(err.to_string().contains("Unsatisfied"), "got: {err}");

    let err = ns.set("bar", "foo:bar:baz:1.4").unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    assert!(!ns.requirement("bar").unwrap().is_selected());

    ns.set("bar", "1.6").unwrap();
    assert_eq!(ns.requirement("bar").unwrap().version().as_deref(), Some("1.6"));
}

#[test]
fn use_inherits_an_ancestor_requirement() {
    let reg = NamespaceRegistry::new();
    reg.instance("a").need_as("lib", "g:lib:jar:~>1.5").unwrap();
    let child = reg.instance("a:b");
    assert!(matches!(
        child.set("lib", "g:lib:jar:1.4"),
        Err(DepnsError::Unsatisfied { .. })
    ));
    assert!(!child.contains_key("lib"));

    child.set("lib", "g:lib:jar:1.7").unwrap();
    let lib = child.requirement("lib").unwrap();
    assert!(lib.requirement().is_some());
    assert!(lib.is_satisfied());
}

#[test]
fn invalid_values_change_nothing() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    assert!(matches!(
        ns.set("x", "a:b:c:>>1"),
        Err(DepnsError::Parse { .. })
    ));
    assert!(matches!(ns.set("y", "abc"), Err(DepnsError::Parse { .. })));
    assert!(!ns.contains_key("x"));
    assert!(!ns.contains_key("y"));
}

#[test]
fn use_registers_a_group() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    let group = ["its:me:here:1", "its:you:there:2"];
    ns.set("them", group).unwrap();

    let them = ns.requirement("them").unwrap();
    assert!(them.is_group());
    assert_eq!(them.to_specs(), group.to_vec());
    assert!(ns.requirement("its:me:here").is_some());
    assert_eq!(ns.requirement("you").unwrap().to_spec(), "its:you:there:2");
}

#[test]
fn use_spec_infers_the_key() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    ns.use_spec("foo:bar:baz:1.0").unwrap();
    assert_eq!(ns.requirement("bar").unwrap().to_spec(), "foo:bar:baz:1.0");

    ns.use_spec("pinned -> foo:qux:jar:2.0 -> >=2").unwrap();
    let pinned = ns.requirement("pinned").unwrap();
    assert!(pinned.is_selected());
    assert!(pinned.is_satisfied());
}

#[test]
fn use_all_applies_pairs_in_order() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    ns.use_all([("foo", "group:foo:jar:1"), ("foo", "2")]).unwrap();
    assert_eq!(ns.requirement("foo").unwrap().to_spec(), "group:foo:jar:2");
}

#[test]
fn use_all_changes_nothing_when_a_pair_fails() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.set("kept", "g:kept:jar:1").unwrap();
    let kept = ns.requirement("kept").unwrap();

    let seen = Rc::new(RefCell::new(0));
    let sink = seen.clone();
    kept.add_listener(move |_| *sink.borrow_mut() += 1);

    let err = ns
        .use_all([("a", "g:a:j:1"), ("kept", "2"), ("b", "g:b:j:%")])
        .unwrap_err();
    assert!(matches!(err, DepnsError::Parse { .. }));
    assert!(!ns.contains_key("a"));
    assert!(ns.requirement("g:a:j").is_none());
    assert!(!ns.contains_key("b"));
    assert_eq!(kept.version().as_deref(), Some("1"));
    assert!(ns.requirement("kept").unwrap().ptr_eq(&kept));
    assert_eq!(*seen.borrow(), 0);

    ns.use_all([("a", "g:a:j:1"), ("kept", "2")]).unwrap();
    assert_eq!(kept.version().as_deref(), Some("2"));
    assert_eq!(*seen.borrow(), 1);
}

#[test]
fn use_all_rolls_back_sub_namespace_writes() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    let sub = ns.ns("sub").unwrap();
    sub.need_as("lib", "g:lib:jar:~>1.5").unwrap();

    let err = ns
        .use_all([("sub_lib", "1.6"), ("sub_other", "g:other:jar:1"), ("sub_lib", "1.4")])
        .unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    assert!(!sub.requirement("lib").unwrap().is_selected());
    assert!(!sub.contains_key("other"));
}

#[test]
fn need_all_changes_nothing_when_a_pair_fails() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    let err = ns
        .need_all([("a", "g:a:jar:>=1"), ("b", "g:b:jar:>>1")])
        .unwrap_err();
    assert!(matches!(err, DepnsError::Parse { .. }));
    assert!(ns.keys().is_empty());
    assert!(ns.requirement("g:a:jar").is_none());
}

#[test]
fn use_spec_with_an_unsatisfiable_default_changes_nothing() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    ns.need_as("pinned", "foo:qux:jar:>=1").unwrap();
    let err = ns.use_spec("pinned -> foo:qux:jar:3 -> ~>2.0").unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    let pinned = ns.requirement("pinned").unwrap();
    assert_eq!(pinned.requirement().unwrap().to_string(), ">=1");
    assert!(!pinned.is_selected());
}

#[test]
fn use_refuses_another_coordinate_for_a_needed_key() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need_as("bar", "foo:bar:baz:~>1.5").unwrap();

    let err = ns.set("bar", "other:bar:baz:1.4").unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    assert!(
        err.to_string().contains("other:bar:baz:1.4 does not satisfy foo:bar:baz:~>1.5"),
        "got: {err}"
    );
    let bar = ns.requirement("bar").unwrap();
    assert_eq!(bar.unversioned_spec().as_deref(), Some("foo:bar:baz"));
    assert_eq!(bar.requirement().unwrap().to_string(), "~>1.5");
    assert!(ns.requirement("other:bar:baz").is_none());

    // without a declared requirement the key can be pointed elsewhere
    ns.set("free", "a:free:jar:1").unwrap();
    ns.set("free", "b:free:jar:2").unwrap();
    assert_eq!(ns.requirement("free").unwrap().to_spec(), "b:free:jar:2");
}

#[test]
fn use_with_a_requirement_narrows_the_declared_one() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.need_as("bar", "foo:bar:baz:~>1.5").unwrap();

    ns.set("bar", "foo:bar:baz:1.6 | <1.5").unwrap();
    let bar = ns.requirement("bar").unwrap();
    assert_eq!(bar.version().as_deref(), Some("1.6"));
    assert!(bar.is_selected());

    let err = ns.set("bar", "1.4").unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    assert_eq!(bar.version().as_deref(), Some("1.6"));

    let err = ns.set("bar", "foo:bar:baz:1.4 | 1.3").unwrap_err();
    assert!(matches!(err, DepnsError::Unsatisfied { .. }));
    assert_eq!(bar.version().as_deref(), Some("1.6"));
    assert!(bar.requirement().unwrap().satisfied_by("1.6").unwrap());
    assert!(!bar.requirement().unwrap().satisfied_by("1.7").unwrap());
}

#[test]
fn alias_of_an_inherited_entry_stays_local() {
    let reg = NamespaceRegistry::new();
    let parent = reg.instance("p");
    parent.set("x", "g:x:j:1").unwrap();
    let child = reg.instance("p:c");

    let y = child.alias("y", "x").unwrap();
    assert!(child.requirement("x").unwrap().ptr_eq(&y));
    assert!(!parent.requirement("x").unwrap().ptr_eq(&y));

    child.set("y", "2").unwrap();
    assert_eq!(child.requirement("x").unwrap().version().as_deref(), Some("2"));
    assert_eq!(parent.requirement("x").unwrap().version().as_deref(), Some("1"));

    assert!(matches!(
        child.alias("z", "missing"),
        Err(DepnsError::Lookup { .. })
    ));
}

#[test]
fn alias_shares_a_local_entry() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    ns.set("x", "g:x:j:1").unwrap();
    let y = ns.alias("y", "x").unwrap();
    ns.set("y", "2").unwrap();
    assert!(ns.requirement("x").unwrap().ptr_eq(&y));
    assert_eq!(ns.requirement("x").unwrap().version().as_deref(), Some("2"));
}

#[test]
fn use_with_a_requirement_reselects() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    ns.set("a", "g:a:j:1.0").unwrap();
    ns.set("a", "g:a:j:2.0 | 3.0").unwrap();
    let a = ns.requirement("a").unwrap();
    assert_eq!(a.version().as_deref(), Some("3.0"));
    assert!(a.is_satisfied());
    assert!(!a.requirement().unwrap().satisfied_by("1.0").unwrap());
}

#[test]
fn keys_with_dashes_and_periods() {
    let reg = NamespaceRegistry::new();
    let ns = reg.root();
    for key in ["a-b", "a.b"] {
        ns.set(key, "a:b:c:1").unwrap();
        let req = ns.requirement(key).unwrap();
        assert_eq!(req.version().as_deref(), Some("1"));
        assert_eq!(req.id().as_deref(), Some("b"));
    }
}

#[test]
fn version_strings_reselect() {
    let reg = NamespaceRegistry::new();
    let foo = reg.root();
    foo.set("bar", "a:b:c:1.0").unwrap();
    foo.set("bar", "2.0").unwrap();
    assert_eq!(foo.requirement("bar").unwrap().version().as_deref(), Some("2.0"));
    foo.requirement("bar").unwrap().select("3.0").unwrap();
    assert_eq!(foo.requirement("bar").unwrap().to_spec(), "a:b:c:3.0");
}

// ── sub-namespaces ──────────────────────────────────────────────────────

#[test]
fn ns_creates_a_sub_namespace() {
    let reg = NamespaceRegistry::new();
    let root = reg.root();
    let foo = root.ns("foo").unwrap();
    assert!(matches!(root.get("foo"), Some(Entry::Namespace(_))));
    assert_ne!(reg.instance("foo"), foo);
    assert_eq!(foo.parent(), Some(root));
    assert_eq!(foo.name(), "foo");
    assert_eq!(foo.ns("bar").unwrap().name(), "foo:bar");
}

#[test]
fn ns_with_applies_use_arguments() {
    let reg = NamespaceRegistry::new();
    let root = reg.root();
    root.ns_with("foo", |foo| {
        foo.use_all([("bar", "foo:bar:jar:0"), ("baz", "foo:baz:jar:0")])?;
        Ok(())
    })
    .unwrap();
    assert!(root.sub("foo").unwrap().has("bar"));
    assert!(root.has("foo_baz"));
    assert!(root.requirement("foo_bar").unwrap().is_selected());
}

#[test]
fn compound_keys_read_and_write_through_sub_namespaces() {
    let reg = NamespaceRegistry::new();
    let root = reg.root();
    let foo = root.ns("foo").unwrap();
    let bat = foo.ns("bat").unwrap();
    bat.use_spec("bat:man:jar:>=2").unwrap();

    let batman = root.requirement("foo_bat_man").unwrap();
    assert!(batman.is_selected());
    let entry = root.set("foo_bat_man", "3").unwrap();
    assert_eq!(entry.as_requirement(), Some(&batman));
    assert_eq!(batman.version().as_deref(), Some("3"));
    assert!(matches!(
        root.set("foo_bat_man", "1"),
        Err(DepnsError::Unsatisfied { .. })
    ));
}

#[test]
fn values_include_sub_namespaces() {
    let reg = NamespaceRegistry::new();
    let root = reg.root();
    root.ns("bat").unwrap().use_spec("bat:man:jar:>1").unwrap();
    let values = root.values(false);
    assert!(!values.is_empty());
    assert_eq!(values[0].unversioned_spec().as_deref(), Some("bat:man:jar"));
}

#[test]
fn ns_reopens_and_refuses_requirements() {
    let reg = NamespaceRegistry::new();
    let root = reg.root();
    let bat = root.ns("bat").unwrap();
    assert_eq!(root.ns("bat").unwrap(), bat);

    root.set("foo", "foo:bar:baz:0").unwrap();
    let err = root.ns("foo").unwrap_err();
    assert!(matches!(err, DepnsError::TypeMismatch { .. }));
    assert!(err.to_string().contains("not a sub-namespace"), "got: {err}");

    assert!(matches!(
        root.set("bat", "a:b:c:1"),
        Err(DepnsError::TypeMismatch { .. })
    ));
}

#[test]
fn namespaces_can_be_assigned() {
    let reg = NamespaceRegistry::new();
    let foo = reg.instance("foo");
    foo.set("bar", "foo:bar:baz:0").unwrap();
    let moo = reg.instance("moo");
    moo.set("foo", &foo).unwrap();
    assert_eq!(moo.sub("foo"), Some(foo.clone()));
    assert!(moo
        .requirement("foo_bar")
        .unwrap()
        .ptr_eq(&foo.requirement("bar").unwrap()));
    assert!(matches!(
        moo.set("self", &moo),
        Err(DepnsError::TypeMismatch { .. })
    ));
}

#[test]
fn assigned_requirements_are_copies() {
    let reg = NamespaceRegistry::new();
    let a = reg.instance("A");
    a.set("foo", "g:a:j:0").unwrap();
    let b = reg.instance("B");
    let foo = a.requirement("foo").unwrap();
    b.ns_with("x", |x| x.set("y", &foo).map(|_| ())).unwrap();

    let y = b.requirement("x_y").unwrap();
    assert_eq!(y.to_spec(), foo.to_spec());
    assert!(!y.ptr_eq(&foo));
}

#[test]
fn use_inherited_copies_by_name() {
    let reg = NamespaceRegistry::new();
    reg.instance("foo").set("bar", "foo:bar:jar:0").unwrap();
    let moo = reg.instance("foo:moo");
    let muu = moo.ns("muu").unwrap();
    muu.use_inherited("bar").unwrap();
    assert!(moo.requirement("muu_bar").unwrap().is_selected());
    assert_ne!(
        muu.requirement("bar").unwrap(),
        moo.requirement("bar").unwrap()
    );
    assert!(matches!(
        muu.use_inherited("nothing"),
        Err(DepnsError::Lookup { .. })
    ));
}

// ── enumeration ─────────────────────────────────────────────────────────

#[test]
fn values_optionally_include_parents() {
    let reg = NamespaceRegistry::new();
    reg.instance("foo").use_spec("foo:one:baz:1.0").unwrap();
    let bar = reg.instance("foo:bar");
    bar.use_spec("foo:two:baz:1.0").unwrap();

    assert_eq!(specs(&bar.values(false)), vec!["foo:two:baz:1.0"]);
    let all = specs(&bar.values(true));
    assert!(all.contains(&"foo:two:baz:1.0".to_string()));
    assert!(all.contains(&"foo:one:baz:1.0".to_string()));
}

#[test]
fn values_at_resolves_names() {
    let reg = NamespaceRegistry::new();
    reg.instance("foo").use_spec("foo:one:baz:1.0").unwrap();
    let bar = reg.instance("foo:bar");
    bar.set("foo_baz", "foo:two:baz:1.0").unwrap();

    assert_eq!(specs(&bar.values_at(&["one"]).unwrap()), vec!["foo:one:baz:1.0"]);
    assert_eq!(
        specs(&bar.values_at(&["foo_baz"]).unwrap()),
        vec!["foo:two:baz:1.0"]
    );
    assert!(bar.values_at(&["missing"]).unwrap().is_empty());
}

#[test]
fn values_at_prefers_the_nearest_namespace() {
    let reg = NamespaceRegistry::new();
    let foo = reg.instance("foo");
    foo.use_spec("foo:one:baz:2.0").unwrap();
    let bar = reg.instance("foo:bar");
    bar.set("older", "foo:one:baz:1.0").unwrap();

    assert_eq!(
        specs(&bar.values_at(&["foo:one:baz"]).unwrap()),
        vec!["foo:one:baz:1.0"]
    );
    assert_eq!(
        specs(&foo.values_at(&["foo:one:baz"]).unwrap()),
        vec!["foo:one:baz:2.0"]
    );
    assert_eq!(
        specs(&bar.values_at(&["foo:one:baz:>1.0"]).unwrap()),
        vec!["foo:one:baz:2.0"]
    );
}

#[test]
fn keys_artifacts_delete_and_clear() {
    let reg = NamespaceRegistry::new();
    let ns = reg.instance("one");
    ns.set("foo", "group:foo:jar:1").unwrap();
    ns.set("bar", "group:bar:jar:1").unwrap();

    let keys = ns.keys();
    assert!(keys.contains(&"foo".to_string()));
    assert!(keys.contains(&"bar".to_string()));

    let all: Vec<String> = ns.artifacts().unwrap().iter().map(Artifact::to_spec).collect();
    assert!(all.contains(&"group:foo:jar:1".to_string()));
    assert!(all.contains(&"group:bar:jar:1".to_string()));

    assert!(ns.delete("bar").is_some());
    let left: Vec<String> = ns.artifacts().unwrap().iter().map(Artifact::to_spec).collect();
    assert_eq!(left, vec!["group:foo:jar:1"]);
    assert!(ns.requirement("group:bar:jar").is_none());
    assert_eq!(ns.requirement("foo").unwrap().to_spec(), "group:foo:jar:1");

    ns.clear();
    assert!(ns.artifacts().unwrap().is_empty());
    assert!(ns.keys().is_empty());
}

#[test]
fn namespaces_iterate_over_their_requirements() {
    let reg = NamespaceRegistry::new();
    let root = reg.root();
    root.use_spec("foo:bar:baz:1.0").unwrap();
    let artifacts: Vec<Artifact> = (&root)
        .into_iter()
        .map(|req| req.artifact().unwrap())
        .collect();
    assert!(artifacts.contains(&Artifact::parse("foo:bar:baz:1.0").unwrap()));
}

// ── per-instance requirements with listeners ────────────────────────────

#[test]
fn detached_namespaces_copy_requirements_and_notify_listeners() {
    let requires = ArtifactNamespace::detached("requires");
    requires
        .require("xmlbeans", "org.apache.xmlbeans:xmlbeans:jar:2.3.0", Some(">2"))
        .unwrap();
    requires
        .require("stax_api", "stax:stax-api:jar:>=1.0.1", None)
        .unwrap();

    let instance = ArtifactNamespace::detached("instance");
    for req in &requires {
        instance.need_as(&req.key(), &req).unwrap();
    }

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    instance
        .requirement("xmlbeans")
        .unwrap()
        .add_listener(move |req| sink.borrow_mut().push(req.to_spec()));

    instance.set("xmlbeans", "3.1415").unwrap();
    assert_eq!(
        *seen.borrow(),
        vec!["org.apache.xmlbeans:xmlbeans:jar:3.1415".to_string()]
    );
    assert!(matches!(
        instance.set("xmlbeans", "1.0"),
        Err(DepnsError::Unsatisfied { .. })
    ));
    assert_eq!(seen.borrow().len(), 1);

    let original = requires.requirement("xmlbeans").unwrap();
    assert!(!original.is_selected());
    assert_eq!(original.version().as_deref(), Some("2.3.0"));
    assert_eq!(
        instance.requirement("stax_api").unwrap().version().as_deref(),
        Some("1.0.1")
    );
}
