use std::error::Error;
use std::io::Read;
use std::path::PathBuf;

use clashhub::SourceEntry;
use clashhub::model::{batch_add_sources, mirror_filename};
use console::style;

use crate::SourcesAction;
use crate::commands::shared::{AppContext, index_from_position, notify, unlock};

pub(crate) async fn handle_sources(
    action: SourcesAction,
    ctx: &AppContext,
    password: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    let mut sources = ctx.documents().await.sources;

    match action {
        SourcesAction::List => print_sources(&sources),
        edit => {
            let session = unlock(&ctx.config, password)?;
            let message = apply_edit(edit, &mut sources)?;
            notify(&message);
            ctx.persist_sources(&session, &sources).await?;
        }
    }
    Ok(())
}

/// Apply one edit and describe it.
fn apply_edit(action: SourcesAction, sources: &mut Vec<SourceEntry>) -> std::io::Result<String> {
    Ok(match action {
        SourcesAction::List => String::new(),
        SourcesAction::Add { urls } => {
            let count = urls.len();
            sources.extend(urls.into_iter().map(SourceEntry::new));
            format!("Added {count} source(s)")
        }
        SourcesAction::Set { position, url } => {
            let index = index_from_position(position, sources.len())?;
            sources[index] = SourceEntry::new(url);
            format!("Updated source {position}")
        }
        SourcesAction::Remove { position } => {
            let index = index_from_position(position, sources.len())?;
            format!("Removed {}", sources.remove(index))
        }
        SourcesAction::BatchAdd { file } => {
            let block = read_block(file)?;
            let added = batch_add_sources(sources, &block);
            format!("Added {added} source(s)")
        }
    })
}

fn read_block(file: Option<PathBuf>) -> std::io::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut block = String::new();
            std::io::stdin().read_to_string(&mut block)?;
            Ok(block)
        }
    }
}

fn print_sources(sources: &[SourceEntry]) {
    if sources.is_empty() {
        println!("No sources configured");
        return;
    }
    // Mirror numbers follow the publishable order, skipping blanks.
    let mut next_mirror = 0;
    for (i, source) in sources.iter().enumerate() {
        if source.is_publishable() {
            println!(
                "{:>3}. {} {}",
                i + 1,
                source.as_str().trim(),
                style(format!("-> {}", mirror_filename(next_mirror))).dim()
            );
            next_mirror += 1;
        } else {
            println!("{:>3}. {}", i + 1, style("(blank, not published)").dim());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use clashhub::cache::{SOURCES_KEY, is_local_only, load_json};
    use clashhub::http::{HttpMethod, HttpResponse, MockTransport};
    use clashhub::{KeyValueStore, MemoryStore};

    use super::*;
    use crate::config::Config;

    fn sources(urls: &[&str]) -> Vec<SourceEntry> {
        urls.iter().map(|u| SourceEntry::new(*u)).collect()
    }

    #[test]
    fn set_and_remove_use_one_based_positions() {
        let mut list = sources(&["https://a", "https://b"]);

        apply_edit(
            SourcesAction::Set {
                position: 2,
                url: "https://c".to_string(),
            },
            &mut list,
        )
        .unwrap();
        apply_edit(SourcesAction::Remove { position: 1 }, &mut list).unwrap();

        assert_eq!(list, sources(&["https://c"]));
        assert!(apply_edit(SourcesAction::Remove { position: 5 }, &mut list).is_err());
    }

    #[test]
    fn add_keeps_blank_placeholders() {
        let mut list = Vec::new();
        apply_edit(
            SourcesAction::Add {
                urls: vec!["https://a".to_string(), String::new()],
            },
            &mut list,
        )
        .unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn batch_add_reads_file_and_keeps_only_http_lines() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(b"https://x/1\n# comment\n\n  https://x/2  \nftp://nope\n")
            .expect("write");

        let mut list = sources(&["https://a"]);
        let message = apply_edit(
            SourcesAction::BatchAdd {
                file: Some(file.path().to_path_buf()),
            },
            &mut list,
        )
        .unwrap();

        assert_eq!(message, "Added 2 source(s)");
        assert_eq!(list, sources(&["https://a", "https://x/1", "https://x/2"]));
    }

    #[tokio::test]
    async fn consecutive_edits_survive_when_the_repository_rejects_them() {
        // Default config: public repository readable, no token to write with.
        let transport = MockTransport::new();
        let raw = "https://raw.githubusercontent.com/zhaifu/clash10/main/clash/sources.json";
        for _ in 0..2 {
            transport.push_response(HttpMethod::Get, raw, HttpResponse::with_status(200, "[]"));
        }
        let store = Arc::new(MemoryStore::new());
        let ctx = AppContext::with_parts(
            Config::default(),
            Arc::new(transport),
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
        );

        for url in ["https://a/x.yaml", "https://b/y.yaml"] {
            handle_sources(
                SourcesAction::Add {
                    urls: vec![url.to_string()],
                },
                &ctx,
                Some("admin"),
            )
            .await
            .expect("edit applies locally");
        }

        let cached: Vec<SourceEntry> = load_json(store.as_ref(), SOURCES_KEY).expect("cached");
        assert_eq!(cached, sources(&["https://a/x.yaml", "https://b/y.yaml"]));
        assert!(is_local_only(store.as_ref(), SOURCES_KEY));
        assert_eq!(ctx.documents().await.sources, cached);
    }
}
