// Colored terminal output for ranked links and sites.
//
// Printed after a one-shot aggregation so an operator can eyeball the
// result without opening the published JSON.

use colored::Colorize;

use super::{format_count, truncate_chars};
use crate::card::CardMetadata;
use crate::snapshot::{Link, Snapshot, SitesSnapshot};

const TITLE_WIDTH: usize = 70;

/// Display each window of a links snapshot.
pub fn display_snapshot(snapshot: &Snapshot) {
    println!(
        "\n{}",
        format!("=== Top Links ({}) ===", snapshot.generated_at.format("%Y-%m-%d %H:%M UTC")).bold()
    );
    display_links("Past hour", &snapshot.top_hour);
    display_links("Past day", &snapshot.top_day);
    display_links("Past week", &snapshot.top_week);
}

fn display_links(heading: &str, links: &[Link]) {
    println!("\n  {}", heading.bold());
    if links.is_empty() {
        println!("  {}", "No links.".dimmed());
        return;
    }

    for link in links {
        println!(
            "  {:>3}. {:>6}  {}",
            link.rank,
            format_count(link.interactions()).cyan(),
            truncate_chars(&link.title, TITLE_WIDTH)
        );
        println!("       {:>6}  {}", "", link.url.dimmed());
        for post in &link.recommended_posts {
            println!(
                "       {:>6}  @{} {}",
                "",
                post.handle.green(),
                truncate_chars(&post.text, TITLE_WIDTH).dimmed()
            );
        }
    }
}

/// Display a sites snapshot with each site's top links.
pub fn display_sites(snapshot: &SitesSnapshot) {
    println!("\n{}", format!("=== Top Sites ({} sites) ===", snapshot.sites.len()).bold());
    if snapshot.sites.is_empty() {
        println!("  {}", "No sites.".dimmed());
        return;
    }

    for site in &snapshot.sites {
        println!(
            "\n  {:>3}. {:<40} {:>6}",
            site.rank,
            site.domain.bold(),
            format_count(site.interactions).cyan()
        );
        for link in &site.links {
            println!(
                "       {:>2}. {:>6}  {}",
                link.rank,
                format_count(link.interactions),
                truncate_chars(&link.title, TITLE_WIDTH)
            );
        }
    }
}

/// Display the result of a card lookup.
pub fn display_card(url: &str, card: &CardMetadata, formatted_title: &str) {
    println!("\n{}", format!("=== Card for {url} ===").bold());
    println!("  Title:     {}", empty_marker(&card.title));
    println!("  Formatted: {}", empty_marker(formatted_title));
    println!("  Image:     {}", empty_marker(&card.image_url));
}

fn empty_marker(value: &str) -> colored::ColoredString {
    if value.is_empty() {
        "(empty)".yellow()
    } else {
        value.normal()
    }
}
