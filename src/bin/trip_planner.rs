//! Terminal front end: streams an itinerary through the proxy and prints the
//! places, the map view and turn-by-turn directions.

use anyhow::{Result, bail};
use itinera::config::PlannerConfig;
use itinera::itinerary::Transcript;
use itinera::planner::TripPlanner;
use itinera::presentation::{MapView, render_turn_list};
use log::info;
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .format_target(false)
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .init();

    let prompt = std::env::args().skip(1).collect::<Vec<String>>().join(" ");
    if prompt.trim().is_empty() {
        bail!("usage: trip_planner <prompt>, e.g. trip_planner 3 day trip to Ranchi");
    }

    let config = PlannerConfig::from_env()?;
    info!("Using proxy at {}", config.proxy_url);
    let mut planner = TripPlanner::new(&config)?;

    // Print only the newly streamed suffix of the assistant entry
    let mut printed = 0usize;
    let view = planner
        .plan_with_updates(&prompt, |transcript: &Transcript| {
            if let Some(entry) = transcript.in_progress() {
                if entry.text.len() < printed {
                    printed = 0;
                }
                if let Some(delta) = entry.text.get(printed..) {
                    print!("{}", delta);
                    let _ = std::io::stdout().flush();
                    printed = entry.text.len();
                }
            }
        })
        .await
        .clone();
    println!();

    if let Some(last) = planner.transcript().lock().await.last() {
        if last.text != view.itinerary {
            println!("{}", last.text);
        }
    }

    if !view.locations.is_empty() {
        println!("\nPlaces:");
        for (i, location) in view.locations.iter().enumerate() {
            println!("  {}. {} ({:.5}, {:.5})", i + 1, location.place, location.lat, location.lng);
        }
    }

    match planner.scene().view() {
        MapView::Center { position, zoom } => {
            println!("\nMap centered on {:.5}, {:.5} at zoom {}", position.y(), position.x(), zoom)
        }
        MapView::FitBounds(bounds) => println!(
            "\nMap fitted to {:.5},{:.5} .. {:.5},{:.5}",
            bounds.min().y,
            bounds.min().x,
            bounds.max().y,
            bounds.max().x
        ),
        MapView::Default => {}
    }

    if let Some(route) = &view.route {
        println!("\nDirections:");
        for line in render_turn_list(route) {
            println!("  {}", line);
        }
    }

    if let Some(notice) = &view.notice {
        println!("\n{}", notice.text());
    }
    Ok(())
}
