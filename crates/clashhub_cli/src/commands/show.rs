use std::error::Error;

use clashhub::{PublicView, ViewOrigin, load_public_view};
use console::style;
use serde_json::json;

use crate::commands::shared::AppContext;

pub(crate) async fn handle_show(ctx: &AppContext, as_json: bool) -> Result<(), Box<dyn Error>> {
    let view = load_public_view(&ctx.gateway, ctx.store.as_ref()).await;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view_json(&view))?);
    } else {
        print_view(&view);
    }
    Ok(())
}

fn view_json(view: &PublicView) -> serde_json::Value {
    json!({
        "origin": view.origin.as_str(),
        "subscriptions": view
            .files
            .iter()
            .map(|f| json!({"name": f.file.name, "url": f.public_url}))
            .collect::<Vec<_>>(),
        "links": view.links,
    })
}

fn print_view(view: &PublicView) {
    println!("{}", style("Subscriptions").bold());
    if view.files.is_empty() {
        println!("  (none published yet)");
    }
    for file in &view.files {
        println!("  {:24} {}", file.file.name, style(&file.public_url).cyan());
    }
    match view.origin {
        ViewOrigin::Probe => println!("  {}", style("directory listing unavailable, showing probed files").dim()),
        ViewOrigin::Cache => println!("  {}", style("repository unreachable, showing cached list").dim()),
        ViewOrigin::Listing | ViewOrigin::Unavailable => {}
    }

    if !view.links.is_empty() {
        println!();
        println!("{}", style("Links").bold());
        for link in &view.links {
            let icon = link.icon.as_deref().filter(|_| !link.icon_is_url()).unwrap_or("•");
            println!("  {icon} {:20} {}", link.name, link.url);
        }
    }
}
