//! Example: normalize a foreign document that embeds HDX elements
//!
//! Run with `RUST_LOG=hdx=debug` to see what the normalizer does.

use hdx::hdx_dom::DomTree;
use hdx::{HdxConfig, HdxFactory, ResourceTypeRegistry, HDX_NAMESPACE};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = HdxConfig::from_json(r#"{ "default-base": "file:///data/archive/" }"#)?;
    let factory = HdxFactory::new(ResourceTypeRegistry::standard(), config)?;

    let mut tree = DomTree::new();
    let doc = tree.document();
    let run = tree.create_element("run")?;
    tree.append_child(doc, run)?;
    tree.set_attribute(run, "xml:base", "night-42/")?;

    let title = tree.create_element_ns(Some(HDX_NAMESPACE), "h:title")?;
    let text = tree.create_text_node("M31 in H-alpha");
    tree.append_child(title, text)?;
    tree.append_child(run, title)?;

    let frame = tree.create_element("frame")?;
    tree.set_attribute_ns(frame, Some(HDX_NAMESPACE), "h:name", "image")?;
    tree.set_attribute_ns(frame, Some(HDX_NAMESPACE), "h:uri", "m31.fits")?;
    tree.append_child(run, frame)?;

    let source = tree.shared();
    let mut container = factory.new_container(&source, run)?;
    let registry = factory.registry();

    println!("HDX v{}", hdx::VERSION);
    println!("title: {}", container.title(registry).unwrap_or_default());
    let image = registry.match_name("image");
    for element in container.find_all(registry, image) {
        if let Some(url) = factory.resolve_location(container.tree_mut(), element)? {
            println!("image at {url}");
        }
    }
    Ok(())
}
