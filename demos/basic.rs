//! Basic introduction to tagalong.
//!
//! This example walks through:
//! 1. Attaching properties to an object you do not own
//! 2. Atomic updates through a property handle
//! 3. Keeping unrelated subsystems apart with scopes
//! 4. Properties disappearing together with their carrier

use std::sync::{Arc, Weak};

use tagalong::{global, prelude::*};
use tracing_subscriber::util::SubscriberInitExt;

/// A type from some other crate: we cannot add fields to it.
struct Window {
    title: String,
}

/// Tags a window with a tooltip through the default scope.
fn tag_window(window: &Arc<Window>) -> Result<(), PropertyError> {
    global::set(window, "tooltip", format!("{} (ready)", window.title))?;
    Ok(())
}

/// Counts clicks with an optimistic create-or-update loop.
fn click(scope: &Scope, window: &Arc<Window>) -> Result<u32, PropertyError> {
    let clicks = scope
        .handle(window, "clicks")?
        .create_or_update(|| 1_u32, |current| current.downcast_ref::<u32>().map_or(1, |n| n + 1));
    Ok(clicks.downcast_ref::<u32>().copied().unwrap_or_default())
}

fn main() -> Result<(), PropertyError> {
    let _guard = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .finish()
        .set_default();

    println!("=== Attaching properties ===\n");
    let window = Arc::new(Window {
        title: "Main".to_string(),
    });
    tag_window(&window)?;
    let tooltip = global::get(&window, "tooltip")?;
    println!("tooltip: {:?}", tooltip.downcast_ref::<String>());

    match global::handle(&window, "tooltip")?.connect("again") {
        Ok(()) => println!("connected twice?"),
        Err(error) => println!("second connect refused: {error}"),
    }
    println!();

    println!("=== Atomic updates ===\n");
    let ui = Scope::named("ui");
    for _ in 0..3 {
        println!("clicks: {}", click(&ui, &window)?);
    }
    let state = ui.handle(&window, "state")?;
    state.set("idle");
    println!("idle -> busy: {}", state.try_update("busy", "idle"));
    println!("idle -> busy again: {}", state.try_update("busy", "idle"));
    println!();

    println!("=== Scopes ===\n");
    let net = Scope::named("net");
    println!(
        "\"clicks\" in net scope: {:?}",
        net.handle(&window, "clicks")?.try_get()
    );
    println!("ui scope holds: {:?}", ui.names(&window));
    println!();

    println!("=== Lifetimes ===\n");
    // Point back at the carrier weakly, or it would keep itself alive.
    ui.handle(&window, "self")?
        .set(PropertyValue::opaque(Arc::downgrade(&window)));
    let weak: Weak<Window> = Arc::downgrade(&window);
    drop(window);
    println!("window alive: {}", weak.upgrade().is_some());
    println!("reclaimed from ui scope: {}", ui.purge());
    println!("carriers left in ui scope: {}", ui.carrier_count());
    println!("default scope: {:?}", default_scope());

    // Value types are keyed by contents and are refused by the checked API.
    if let Err(error) = ui.handle(&42_u32, "answer") {
        println!("\n{error}");
    }

    Ok(())
}
