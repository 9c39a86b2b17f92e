use std::error::Error;

use clashhub::CustomLinkEntry;
use clashhub::model::{LinkEditError, next_link_id, remove_link, upsert_link};
use console::style;

use crate::LinksAction;
use crate::commands::shared::{AppContext, notify, unlock};

pub(crate) async fn handle_links(
    action: LinksAction,
    ctx: &AppContext,
    password: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let mut links = ctx.documents().await.links;

    match action {
        LinksAction::List => print_links(&links),
        edit => {
            let session = unlock(&ctx.config, password)?;
            let message = apply_edit(edit, &mut links)?;
            notify(&message);
            ctx.persist_links(&session, &links).await?;
        }
    }
    Ok(())
}

fn apply_edit(action: LinksAction, links: &mut Vec<CustomLinkEntry>) -> Result<String, LinkEditError> {
    match action {
        LinksAction::List => Ok(String::new()),
        LinksAction::Add {
            name,
            url,
            icon,
            color,
        } => {
            let mut link = CustomLinkEntry::draft();
            link.id = next_link_id(links);
            link.name = name;
            link.url = url;
            link.icon = icon.filter(|i| !i.trim().is_empty());
            if let Some(color) = color {
                link.color = color;
            }
            let message = format!("Added link {} ({})", link.name, link.id);
            upsert_link(links, link)?;
            Ok(message)
        }
        LinksAction::Edit {
            id,
            name,
            url,
            icon,
            color,
        } => {
            let mut link = links
                .iter()
                .find(|l| l.id == id)
                .cloned()
                .ok_or_else(|| LinkEditError::UnknownId(id.clone()))?;
            if let Some(name) = name {
                link.name = name;
            }
            if let Some(url) = url {
                link.url = url;
            }
            if let Some(icon) = icon {
                link.icon = Some(icon).filter(|i| !i.trim().is_empty());
            }
            if let Some(color) = color {
                link.color = color;
            }
            upsert_link(links, link)?;
            Ok(format!("Updated link {id}"))
        }
        LinksAction::Remove { id } => {
            let removed = remove_link(links, &id)?;
            Ok(format!("Removed link {}", removed.name))
        }
    }
}

fn print_links(links: &[CustomLinkEntry]) {
    if links.is_empty() {
        println!("No links configured");
        return;
    }
    for link in links {
        let icon = link.icon.as_deref().unwrap_or("");
        println!(
            "{:>15}  {:20} {} {} {}",
            style(&link.id).dim(),
            link.name,
            link.url,
            style(&link.color).dim(),
            icon
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(links: &mut Vec<CustomLinkEntry>, name: &str) -> String {
        apply_edit(
            LinksAction::Add {
                name: name.to_string(),
                url: format!("https://{name}.example"),
                icon: None,
                color: None,
            },
            links,
        )
        .unwrap()
    }

    #[test]
    fn add_assigns_distinct_ids_and_default_color() {
        let mut links = Vec::new();
        add(&mut links, "one");
        add(&mut links, "two");

        assert_eq!(links.len(), 2);
        assert_ne!(links[0].id, links[1].id);
        assert_eq!(links[0].color, "#3b82f6");
    }

    #[test]
    fn add_requires_name_and_url() {
        let mut links = Vec::new();
        let err = apply_edit(
            LinksAction::Add {
                name: "  ".to_string(),
                url: "https://x".to_string(),
                icon: None,
                color: None,
            },
            &mut links,
        )
        .unwrap_err();
        assert_eq!(err, LinkEditError::Incomplete);
        assert!(links.is_empty());
    }

    #[test]
    fn edit_changes_only_given_fields_and_blank_icon_clears() {
        let mut links = Vec::new();
        add(&mut links, "one");
        links[0].icon = Some("📣".to_string());
        let id = links[0].id.clone();

        apply_edit(
            LinksAction::Edit {
                id: id.clone(),
                name: Some("renamed".to_string()),
                url: None,
                icon: Some(String::new()),
                color: None,
            },
            &mut links,
        )
        .unwrap();

        assert_eq!(links[0].name, "renamed");
        assert_eq!(links[0].url, "https://one.example");
        assert!(links[0].icon.is_none());
    }

    #[test]
    fn unknown_ids_are_rejected() {
        let mut links = Vec::new();
        let err = apply_edit(LinksAction::Remove { id: "42".to_string() }, &mut links).unwrap_err();
        assert_eq!(err, LinkEditError::UnknownId("42".to_string()));
    }
}
