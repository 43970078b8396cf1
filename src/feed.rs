use chrono::NaiveDateTime;
use rss::{ChannelBuilder, ItemBuilder};

use crate::error::Result;
use crate::filter::MovieListing;

/// Generate an RSS feed from a filtered view, one item per movie.
pub fn generate_rss(
    listings: &[MovieListing],
    now: NaiveDateTime,
    channel_title: &str,
    channel_link: &str,
    channel_description: &str,
) -> Result<String> {
    let mut items = Vec::new();

    for listing in listings {
        let movie = &listing.movie;
        let mut description_parts = Vec::new();

        if let (Some(next), Some(cinemas)) =
            (&listing.summary.next_showtime, &listing.summary.cinema_names)
        {
            description_parts.push(format!("Επόμενη: {} - {}", next, cinemas));
        }

        for cinema in &listing.cinemas {
            let times = cinema
                .showtimes
                .iter()
                .map(|s| s.label(now))
                .collect::<Vec<_>>()
                .join(", ");
            let place = match &cinema.showing.region {
                Some(region) if !region.is_empty() => {
                    format!("{} ({})", cinema.showing.cinema, region)
                }
                _ => cinema.showing.cinema.clone(),
            };
            description_parts.push(format!("{}: {}", place, times));
        }

        let link = movie
            .athinorama_link
            .clone()
            .or_else(|| movie.imdb_link.clone())
            .unwrap_or_else(|| channel_link.to_string());

        let guid = rss::Guid {
            value: link.clone(),
            permalink: true,
        };

        let mut item_builder = ItemBuilder::default();
        item_builder.title(movie.display_title());
        item_builder.link(link);
        item_builder.description(description_parts.join("<br/>\n"));
        item_builder.guid(guid);

        items.push(item_builder.build());
    }

    let channel = ChannelBuilder::default()
        .title(channel_title)
        .link(channel_link)
        .description(channel_description)
        .items(items)
        .build();

    let mut buf = Vec::new();
    channel.write_to(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
