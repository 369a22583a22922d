use std::io::Write;

use tokio::sync::mpsc;

use crate::interrupt;

const SENTINEL: &str = "fin";
const SCHEMES: [&str; 2] = ["http://", "https://"];

enum Line {
    Empty,
    Sentinel,
    Invalid,
    Url(String),
}

fn classify(raw: &str) -> Line {
    let line = raw.trim();
    if line.is_empty() {
        return Line::Empty;
    }
    if line.eq_ignore_ascii_case(SENTINEL) {
        return Line::Sentinel;
    }
    // Minimal validation: it has to at least look like an http(s) link
    if SCHEMES.iter().any(|scheme| line.starts_with(scheme)) {
        return Line::Url(line.to_owned());
    }
    Line::Invalid
}

// Returns false once the sentinel ends collection.
fn accept_line(links: &mut Vec<String>, raw: &str) -> bool {
    match classify(raw) {
        Line::Empty => true,
        Line::Sentinel => false,
        Line::Invalid => {
            println!("⚠️  That does not look like a valid link. Try again or type '{SENTINEL}'.");
            true
        }
        Line::Url(url) => {
            links.push(url);
            true
        }
    }
}

pub async fn collect() -> Vec<String> {
    println!("📥 Enter video links (type '{SENTINEL}' to finish):");

    // stdin is read on its own thread so Ctrl-C cannot leave the runtime
    // stuck behind a blocked read
    let (tx, mut rx) = mpsc::channel::<String>(8);
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut links = Vec::new();
    loop {
        print!("> ");
        let _ = std::io::stdout().flush();
        tokio::select! {
            () = interrupt::wait() => {
                println!("\n🔚 Input interrupted. Continuing with the links collected so far.");
                break;
            }
            line = rx.recv() => match line {
                Some(raw) => {
                    if !accept_line(&mut links, &raw) {
                        break;
                    }
                }
                // End of input behaves like an interrupt
                None => {
                    println!("\n🔚 Input interrupted. Continuing with the links collected so far.");
                    break;
                }
            }
        }
    }
    log::debug!("collected {} link(s)", links.len());
    links
}
