//! Edge case tests for hdx
//!
//! These tests cover rare scenarios and boundary conditions of the registry,
//! the normalizer and the factory.

use hdx::hdx_dom::{DomTree, NodeId, NodeType};
use hdx::{
    HdxConfig, HdxError, HdxFactory, NormalizeError, Normalizer, ResourceType, ResourceTypeDef,
    ResourceTypeRegistry, UnrecognizedPolicy, HDX_NAMESPACE,
};

const NS: &str = HDX_NAMESPACE;

fn element(tree: &mut DomTree, parent: NodeId, name: &str) -> NodeId {
    let el = tree.create_element(name).unwrap();
    tree.append_child(parent, el).unwrap();
    el
}

fn hdx_element(tree: &mut DomTree, parent: NodeId, name: &str) -> NodeId {
    let el = tree.create_element_ns(Some(NS), &format!("h:{name}")).unwrap();
    tree.append_child(parent, el).unwrap();
    el
}

// ============================================================================
// REGISTRY EDGE CASES
// ============================================================================

#[test]
fn test_registry_without_container() {
    let result = ResourceTypeRegistry::builder()
        .register(ResourceTypeDef::new("data"))
        .build();
    assert!(matches!(result, Err(HdxError::Registry(_))));
}

#[test]
fn test_registry_rejects_reserved_name() {
    let result = ResourceTypeRegistry::builder()
        .container(ResourceTypeDef::new("ndx"))
        .register(ResourceTypeDef::new("none"))
        .build();
    assert!(matches!(result, Err(HdxError::Registry(_))));
}

#[test]
fn test_none_type_has_nothing() {
    let registry = ResourceTypeRegistry::standard();
    assert!(registry.get(ResourceType::NONE).is_none());
    assert!(registry.hoist_attribute(ResourceType::NONE).is_none());
    assert!(registry.factories(ResourceType::NONE).is_empty());
    assert!(!registry.is_container(ResourceType::NONE));
    assert!(registry.types().all(|t| !t.is_none()));
}

#[test]
fn test_badbits_accepts_decimal_and_hex() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    for (value, valid) in [("255", true), ("-1", true), ("0x00ff", true), ("0xzz", false), ("", false)] {
        let el = tree.create_element("badbits").unwrap();
        tree.set_attribute(el, "value", value).unwrap();
        assert_eq!(registry.validate(&tree, el), valid, "value {value:?}");
    }
}

#[test]
fn test_container_tolerates_whitespace_and_comments() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let ndx = element(&mut tree, doc, "ndx");
    let ws = tree.create_text_node("\n  ");
    tree.append_child(ndx, ws).unwrap();
    let note = tree.create_comment("generated");
    tree.append_child(ndx, note).unwrap();
    let image = element(&mut tree, ndx, "image");
    tree.set_attribute(image, "uri", "img.fits").unwrap();
    assert!(registry.validate(&tree, ndx));

    let words = tree.create_text_node("stray words");
    tree.append_child(ndx, words).unwrap();
    assert!(!registry.validate(&tree, ndx));
}

// ============================================================================
// NORMALIZER EDGE CASES
// ============================================================================

#[test]
fn test_hoist_skipped_with_element_content() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let title = hdx_element(&mut tree, top, "title");
    let text = tree.create_text_node("Crab");
    tree.append_child(title, text).unwrap();
    element(&mut tree, title, "em");
    let source = tree.shared();

    let result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let title = result.tree().first_child(result.root()).unwrap();
    assert!(!result.tree().attributes(title).unwrap().contains_key("value"));
}

#[test]
fn test_existing_attribute_beats_hoist() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let title = hdx_element(&mut tree, top, "title");
    tree.set_attribute(title, "value", "Declared").unwrap();
    let text = tree.create_text_node("From text");
    tree.append_child(title, text).unwrap();
    let source = tree.shared();

    let result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let title = result.tree().first_child(result.root()).unwrap();
    assert_eq!(
        result.tree().attributes(title).unwrap().get("value").as_deref(),
        Some("Declared")
    );
}

#[test]
fn test_opaque_content_copied() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let data = hdx_element(&mut tree, top, "data");
    tree.set_attribute(data, "uri", "a.sdf").unwrap();
    let wcs = hdx_element(&mut tree, top, "wcs");
    let frame = element(&mut tree, wcs, "frame");
    tree.set_attribute(frame, "system", "ICRS").unwrap();
    let source = tree.shared();

    let mut result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let root = result.root();
    let kids = result.tree_mut().child_elements(root);
    assert_eq!(kids.len(), 2);
    let frame_copy = result.tree().first_child(kids[1]).unwrap();
    assert_eq!(result.tree().node_name(frame_copy).as_deref(), Some("frame"));
    assert_eq!(result.tree_mut().attribute(frame_copy, "system").as_deref(), Some("ICRS"));
    assert!(result.is_valid(&registry));
}

#[test]
fn test_dangling_shadow_reads_absent() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let data = hdx_element(&mut tree, top, "data");
    tree.set_attribute(data, "uri", "a.sdf").unwrap();
    let source = tree.shared();

    let mut result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let data = result.tree().first_child(result.root()).unwrap();
    drop(source);

    assert!(result.tree_mut().attribute(data, "uri").is_none());
    result.tree_mut().set_attribute(data, "uri", "b.sdf").unwrap();
    assert_eq!(result.tree_mut().attribute(data, "uri").as_deref(), Some("b.sdf"));
    assert!(!result.tree().attributes(data).unwrap().is_shadow("uri"));
}

#[test]
fn test_source_borrowed_during_write_is_an_error() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let data = hdx_element(&mut tree, top, "data");
    tree.set_attribute(data, "uri", "a.sdf").unwrap();
    let source = tree.shared();

    let mut result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let data = result.tree().first_child(result.root()).unwrap();
    let guard = source.borrow();
    assert!(result.tree_mut().set_attribute(data, "uri", "b.sdf").is_err());
    drop(guard);
    assert!(result.tree_mut().set_attribute(data, "uri", "b.sdf").is_ok());
}

#[test]
fn test_plain_mode_ignores_namespaced_children() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let ndx = element(&mut tree, doc, "ndx");
    let data = element(&mut tree, ndx, "data");
    tree.set_attribute(data, "uri", "a.sdf").unwrap();
    tree.set_attribute_ns(data, Some(NS), "h:units", "Jy").unwrap();
    hdx_element(&mut tree, ndx, "variance");
    let source = tree.shared();

    let result = Normalizer::new(&registry).normalize(&source, ndx).unwrap();
    let root = result.root();
    let kids: Vec<NodeId> = result.tree().child_iter(root).collect();
    assert_eq!(kids.len(), 1);
    let attrs = result.tree().attributes(kids[0]).unwrap();
    assert_eq!(attrs.names(), vec!["uri".to_string()]);
}

#[test]
fn test_xml_base_shadowed_in_both_modes() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let data = hdx_element(&mut tree, top, "data");
    tree.set_attribute(data, "uri", "a.sdf").unwrap();
    tree.set_attribute(data, "xml:base", "http://host/").unwrap();
    let source = tree.shared();

    let result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let data = result.tree().first_child(result.root()).unwrap();
    let attrs = result.tree().attributes(data).unwrap();
    assert!(attrs.is_shadow("xml:base"));
    assert_eq!(attrs.get("xml:base").as_deref(), Some("http://host/"));
}

#[test]
fn test_skip_policy_with_only_unrecognized() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    hdx_element(&mut tree, top, "spectrum");
    let source = tree.shared();
    let result = Normalizer::new(&registry)
        .unrecognized(UnrecognizedPolicy::Skip)
        .normalize(&source, top);
    assert!(matches!(result, Err(NormalizeError::Empty)));
}

#[test]
fn test_custom_namespace() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let data = tree.create_element_ns(Some("urn:example:hdx"), "x:data").unwrap();
    tree.append_child(top, data).unwrap();
    let source = tree.shared();

    let default = Normalizer::new(&registry).normalize(&source, top);
    assert!(matches!(default, Err(NormalizeError::Empty)));

    let custom = Normalizer::new(&registry)
        .namespace("urn:example:hdx")
        .normalize(&source, top)
        .unwrap();
    let kid = custom.tree().first_child(custom.root()).unwrap();
    assert_eq!(custom.tree().node_type(kid), Some(NodeType::Element));
    assert_eq!(custom.tree().node_name(kid).as_deref(), Some("data"));
}

#[test]
fn test_deep_foreign_tree() {
    let registry = ResourceTypeRegistry::standard();
    let mut tree = DomTree::new();
    let doc = tree.document();
    let top = element(&mut tree, doc, "observation");
    let mut current = top;
    for _ in 0..1000 {
        current = element(&mut tree, current, "level");
    }
    let data = hdx_element(&mut tree, current, "data");
    tree.set_attribute(data, "uri", "deep.sdf").unwrap();
    let source = tree.shared();

    let result = Normalizer::new(&registry).normalize(&source, top).unwrap();
    let kid = result.tree().first_child(result.root()).unwrap();
    assert_eq!(result.tree().node_name(kid).as_deref(), Some("data"));
}

// ============================================================================
// FACTORY EDGE CASES
// ============================================================================

#[test]
fn test_malformed_uri_is_checked_error() {
    let factory = HdxFactory::new(
        ResourceTypeRegistry::standard(),
        HdxConfig {
            default_base: Some("file:///work/".into()),
            ..HdxConfig::default()
        },
    )
    .unwrap();
    let mut tree = DomTree::new();
    let data = tree.create_element("data").unwrap();
    tree.set_attribute(data, "uri", "http://[broken").unwrap();
    let err = factory.resolve_location(&mut tree, data).unwrap_err();
    assert!(matches!(err, HdxError::Resolve(_)));
    assert!(!err.is_contract_violation());
}

#[test]
fn test_malformed_cached_url() {
    let factory = HdxFactory::standard();
    let mut tree = DomTree::new();
    let data = tree.create_element("data").unwrap();
    tree.set_attribute(data, "url", "not absolute").unwrap();
    assert!(matches!(
        factory.resolve_location(&mut tree, data),
        Err(HdxError::Location { .. })
    ));
}

#[test]
fn test_element_without_location() {
    let factory = HdxFactory::standard();
    let mut tree = DomTree::new();
    let title = tree.create_element("title").unwrap();
    assert_eq!(factory.resolve_location(&mut tree, title).unwrap(), None);
}

#[test]
fn test_config_with_bad_base() {
    let config = HdxConfig::from_json(r#"{ "default-base": "relative/dir" }"#).unwrap();
    assert!(matches!(
        HdxFactory::new(ResourceTypeRegistry::standard(), config),
        Err(HdxError::Location { .. })
    ));
}
