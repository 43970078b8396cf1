//! Time-window filtering, selection and per-movie summaries.
//!
//! Everything here is a pure function of the catalog, the caller's
//! [`FilterSelection`] and the reference time.

use std::collections::BTreeSet;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, CinemaShowing, Movie};
use crate::geo::NearbySearch;
use crate::showtime::{self, ResolvedShowtime, ShowtimeRecord, SortValue};

const NEXT_HOURS_MINUTES: u32 = 180;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeWindow {
    /// Every upcoming showtime, from now on.
    #[default]
    All,
    /// The rest of today.
    Today,
    /// Today, no later than three hours from now.
    Next3Hours,
}

impl TimeWindow {
    fn same_day_only(self) -> bool {
        !matches!(self, TimeWindow::All)
    }

    fn horizon_minutes(self) -> Option<u32> {
        match self {
            TimeWindow::Next3Hours => Some(NEXT_HOURS_MINUTES),
            _ => None,
        }
    }

    /// Whether a showtime resolved as `resolved` is visible at `now`.
    ///
    /// Past days never survive, nor do earlier times of the current day
    /// (minute precision). Labels without a time are only kept by `All`.
    pub fn admits(self, resolved: Option<&ResolvedShowtime>, now: NaiveDateTime) -> bool {
        let Some(resolved) = resolved else {
            return !self.same_day_only();
        };
        let date = resolved.timestamp.date();
        let today = now.date();

        if date < today {
            return false;
        }
        if date > today {
            return !self.same_day_only();
        }

        let now_mins = minutes_of_day(now);
        let mins = minutes_of_day(resolved.timestamp);
        mins >= now_mins && self.horizon_minutes().is_none_or(|h| mins <= now_mins + h)
    }
}

fn minutes_of_day(t: NaiveDateTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// Prunes every timetable to the showtimes visible in `window`.
///
/// The movie-indexed shape is kept; blank strings are removed and cinemas
/// left without showtimes drop out of their group.
pub fn apply_time_window(
    groups: &[Vec<CinemaShowing>],
    window: TimeWindow,
    now: NaiveDateTime,
) -> Vec<Vec<CinemaShowing>> {
    groups
        .iter()
        .map(|cinemas| {
            cinemas
                .iter()
                .filter_map(|cinema| {
                    let timetable = cinema
                        .timetable
                        .iter()
                        .map(|batch| {
                            batch
                                .iter()
                                .filter(|raw| !raw.trim().is_empty())
                                .filter(|raw| {
                                    window.admits(showtime::parse(raw, now).as_ref(), now)
                                })
                                .cloned()
                                .collect::<Vec<_>>()
                        })
                        .collect::<Vec<_>>();
                    let pruned = CinemaShowing {
                        timetable,
                        ..cinema.clone()
                    };
                    pruned.has_showtimes().then_some(pruned)
                })
                .collect()
        })
        .collect()
}

/// The caller's current filter state. Empty sets place no constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterSelection {
    pub movies: BTreeSet<usize>,
    pub cinemas: BTreeSet<String>,
    pub regions: BTreeSet<String>,
    pub mode: TimeWindow,
    /// Set after a proximity search: an empty cinema set then means "nothing nearby".
    pub nearby_only: bool,
}

impl FilterSelection {
    pub fn new(mode: TimeWindow) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Narrows the cinemas to a proximity search result, dropping the region filter.
    pub fn with_nearby(&self, search: &NearbySearch) -> Self {
        Self {
            cinemas: search.names().map(str::to_string).collect(),
            regions: BTreeSet::new(),
            nearby_only: true,
            ..self.clone()
        }
    }

    fn wants_movie(&self, index: usize) -> bool {
        self.movies.is_empty() || self.movies.contains(&index)
    }

    fn wants_cinema(&self, cinema: &CinemaShowing) -> bool {
        let cinema_ok = self.cinemas.is_empty() || self.cinemas.contains(&cinema.cinema);
        let region_ok = self.regions.is_empty()
            || cinema
                .region
                .as_ref()
                .is_some_and(|r| self.regions.contains(r));
        cinema_ok && region_ok
    }
}

/// A retained cinema with its showtimes in chronological order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CinemaListing {
    pub showing: CinemaShowing,
    pub showtimes: Vec<ShowtimeRecord>,
}

impl CinemaListing {
    pub fn new(showing: CinemaShowing, now: NaiveDateTime) -> Self {
        let mut showtimes: Vec<ShowtimeRecord> = showing
            .flat_showtimes()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| ShowtimeRecord::new(raw, now))
            .collect();
        // Stable: equal timestamps keep their timetable order.
        showtimes.sort_by_key(ShowtimeRecord::sort_value);
        Self { showing, showtimes }
    }

    pub fn earliest(&self) -> Option<&ShowtimeRecord> {
        self.showtimes.first().filter(|s| s.is_parseable())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovieSummary {
    pub next_showtime: Option<String>,
    /// Cinemas sharing the earliest showtime, comma-joined.
    pub cinema_names: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieListing {
    pub index: usize,
    pub movie: Movie,
    pub cinemas: Vec<CinemaListing>,
    pub summary: MovieSummary,
}

/// Earliest showtime across `cinemas` and every cinema that has it.
pub fn summarize(cinemas: &[CinemaListing], now: NaiveDateTime) -> MovieSummary {
    let mut earliest: Option<(SortValue, &ShowtimeRecord)> = None;
    let mut names: Vec<&str> = Vec::new();

    for listing in cinemas {
        let Some(first) = listing.earliest() else {
            continue;
        };
        let value = first.sort_value();
        match earliest {
            Some((best, _)) if value > best => continue,
            Some((best, _)) if value == best => {}
            _ => {
                earliest = Some((value, first));
                names.clear();
            }
        }
        let name = listing.showing.cinema.as_str();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    match earliest {
        Some((_, record)) => MovieSummary {
            next_showtime: showtime::format(&record.raw, now),
            cinema_names: Some(names.join(", ")),
        },
        None => MovieSummary::default(),
    }
}

/// Applies the time window and the selection, dropping movies left without cinemas.
pub fn select(
    catalog: &Catalog,
    selection: &FilterSelection,
    now: NaiveDateTime,
) -> Vec<MovieListing> {
    if selection.nearby_only && selection.cinemas.is_empty() {
        return Vec::new();
    }

    let windowed = apply_time_window(catalog.showings(), selection.mode, now);

    windowed
        .into_iter()
        .enumerate()
        .filter(|(index, _)| selection.wants_movie(*index))
        .filter_map(|(index, cinemas)| {
            let movie = catalog.movie(index)?;
            let cinemas: Vec<CinemaListing> = cinemas
                .into_iter()
                .filter(|c| selection.wants_cinema(c))
                .map(|c| CinemaListing::new(c, now))
                .collect();
            if cinemas.is_empty() {
                return None;
            }
            let summary = summarize(&cinemas, now);
            Some(MovieListing {
                index,
                movie: movie.clone(),
                cinemas,
                summary,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::NearbyCinema;
    use serde_json::json;

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn cinema(name: &str, region: &str, timetable: serde_json::Value) -> CinemaShowing {
        serde_json::from_value(json!({"cinema": name, "region": region, "timetable": timetable}))
            .unwrap()
    }

    fn times(showing: &CinemaShowing) -> Vec<&str> {
        showing.flat_showtimes().collect()
    }

    fn resolved(raw: &str, now: NaiveDateTime) -> Option<ResolvedShowtime> {
        showtime::parse(raw, now)
    }

    #[test]
    fn test_all_drops_past_days_and_earlier_times_today() {
        let now = at("2025-03-10 18:00");
        let groups = vec![vec![cinema(
            "Άστορ",
            "Κέντρο",
            json!([
                ["Κυριακή 9 Μαρ 20:00", "Δευτέρα 10 Μαρ 17:59"],
                ["Δευτέρα 10 Μαρ 18:00", "Τρίτη 11 Μαρ 10:00"]
            ]),
        )]];
        let out = apply_time_window(&groups, TimeWindow::All, now);
        assert_eq!(times(&out[0][0]), vec!["Δευτέρα 10 Μαρ 18:00", "Τρίτη 11 Μαρ 10:00"]);
        assert_eq!(out[0][0].timetable.len(), 2);
    }

    #[test]
    fn test_all_keeps_unparseable_labels_other_modes_drop_them() {
        let now = at("2025-03-10 18:00");
        assert!(TimeWindow::All.admits(None, now));
        assert!(!TimeWindow::Today.admits(None, now));
        assert!(!TimeWindow::Next3Hours.admits(None, now));
    }

    #[test]
    fn test_today_keeps_only_remaining_showtimes_of_today() {
        let now = at("2025-03-10 18:00");
        for (raw, expected) in [
            ("Δευτέρα 10 Μαρ 17:00", false),
            ("Δευτέρα 10 Μαρ 18:00", true),
            ("Δευτέρα 10 Μαρ 23:30", true),
            ("Τρίτη 11 Μαρ 00:30", false),
            ("19:00", true),
        ] {
            assert_eq!(
                TimeWindow::Today.admits(resolved(raw, now).as_ref(), now),
                expected,
                "{raw}"
            );
        }
    }

    #[test]
    fn test_next_three_hours_is_inclusive_and_same_day() {
        let now = at("2025-03-10 18:00");
        for (raw, expected) in [
            ("17:59", false),
            ("18:00", true),
            ("21:00", true),
            ("21:01", false),
            ("Τρίτη 11 Μαρ 19:00", false),
        ] {
            assert_eq!(
                TimeWindow::Next3Hours.admits(resolved(raw, now).as_ref(), now),
                expected,
                "{raw}"
            );
        }

        let late = at("2025-03-10 23:00");
        let after_midnight = resolved("Τρίτη 11 Μαρ 00:30", late);
        assert!(!TimeWindow::Next3Hours.admits(after_midnight.as_ref(), late));
    }

    #[test]
    fn test_cinemas_without_showtimes_are_dropped() {
        let now = at("2025-03-10 18:00");
        let groups = vec![
            vec![
                cinema("Άστορ", "Κέντρο", json!([["Κυριακή 9 Μαρ 20:00"]])),
                cinema("Δαναός", "Αμπελόκηποι", json!([["", "  "]])),
                cinema("Τριανόν", "Κέντρο", json!([["Δευτέρα 10 Μαρ 21:00"]])),
            ],
            vec![],
        ];
        let out = apply_time_window(&groups, TimeWindow::All, now);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].len(), 1);
        assert_eq!(out[0][0].cinema, "Τριανόν");
    }

    #[test]
    fn test_listing_sorts_stably_with_unparseable_last() {
        let now = at("2025-03-10 18:00");
        let listing = CinemaListing::new(
            cinema(
                "Άστορ",
                "",
                json!([
                    ["Τετάρτη 12 Μαρ 20:00", "χωρίς ώρα"],
                    ["Τρίτη 11 Μαρ 22:00", "Τρίτη 11 Μαρ. 22:00"]
                ]),
            ),
            now,
        );
        let raws: Vec<&str> = listing.showtimes.iter().map(|s| s.raw.as_str()).collect();
        assert_eq!(
            raws,
            vec!["Τρίτη 11 Μαρ 22:00", "Τρίτη 11 Μαρ. 22:00", "Τετάρτη 12 Μαρ 20:00", "χωρίς ώρα"]
        );
    }

    #[test]
    fn test_summary_reports_all_cinemas_sharing_the_earliest_time() {
        let now = at("2025-03-10 18:00");
        let cinemas: Vec<CinemaListing> = [
            ("Άστορ", json!([["Τρίτη 11 Μαρ 20:00", "Τετάρτη 12 Μαρ 18:00"]])),
            ("Δαναός", json!([["Τετάρτη 12 Μαρ 18:00"]])),
            ("Τριανόν", json!([["Τρίτη 11 Μαρ 20:00"]])),
            ("Άστορ", json!([["Τρίτη 11 Μαρ 20:00"]])),
        ]
        .into_iter()
        .map(|(name, tt)| CinemaListing::new(cinema(name, "", tt), now))
        .collect();

        let summary = summarize(&cinemas, now);
        assert_eq!(summary.next_showtime.as_deref(), Some("Αύριο 20:00"));
        assert_eq!(summary.cinema_names.as_deref(), Some("Άστορ, Τριανόν"));
    }

    #[test]
    fn test_summary_is_empty_without_parseable_showtimes() {
        let now = at("2025-03-10 18:00");
        let cinemas = vec![CinemaListing::new(cinema("Άστορ", "", json!([["σύντομα"]])), now)];
        assert_eq!(summarize(&cinemas, now), MovieSummary::default());
    }

    fn sample_catalog() -> Catalog {
        let movies = vec![
            Some(Movie { greek_title: "Πρώτη".into(), ..Movie::default() }),
            Some(Movie { greek_title: "Δεύτερη".into(), ..Movie::default() }),
            None,
        ];
        let showings = vec![
            vec![
                cinema("Άστορ", "Κέντρο", json!([["Δευτέρα 10 Μαρ 19:00"]])),
                cinema("Αίγλη", "Χαλάνδρι", json!([["Δευτέρα 10 Μαρ 22:30"]])),
            ],
            vec![cinema("Αίγλη", "Χαλάνδρι", json!([["Τρίτη 11 Μαρ 21:00"]]))],
            vec![cinema("Άστορ", "Κέντρο", json!([["Δευτέρα 10 Μαρ 19:00"]]))],
        ];
        Catalog::new(movies, showings)
    }

    #[test]
    fn test_select_applies_selection_and_drops_empty_movies() {
        let now = at("2025-03-10 18:00");
        let catalog = sample_catalog();

        let all = select(&catalog, &FilterSelection::default(), now);
        assert_eq!(all.iter().map(|m| m.index).collect::<Vec<_>>(), vec![0, 1]);

        let mut selection = FilterSelection::new(TimeWindow::Next3Hours);
        let listings = select(&catalog, &selection, now);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].cinemas.len(), 1);
        assert_eq!(listings[0].summary.next_showtime.as_deref(), Some("19:00"));

        selection.mode = TimeWindow::All;
        selection.regions.insert("Χαλάνδρι".into());
        let listings = select(&catalog, &selection, now);
        assert_eq!(listings.len(), 2);
        assert!(listings.iter().all(|m| m.cinemas.iter().all(|c| c.showing.cinema == "Αίγλη")));

        selection.movies.insert(1);
        assert_eq!(select(&catalog, &selection, now).len(), 1);
    }

    #[test]
    fn test_nearby_selection_clears_regions() {
        let now = at("2025-03-10 18:00");
        let catalog = sample_catalog();
        let mut selection = FilterSelection::default();
        selection.regions.insert("Χαλάνδρι".into());

        let nothing = selection.with_nearby(&NearbySearch::default());
        assert!(nothing.regions.is_empty());
        assert!(select(&catalog, &nothing, now).is_empty());

        let found = selection.with_nearby(&NearbySearch {
            nearby: vec![NearbyCinema { name: "Άστορ".into(), distance_km: 1.2 }],
            without_coordinates: 0,
        });
        let listings = select(&catalog, &found, now);
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].summary.cinema_names.as_deref(), Some("Άστορ"));
    }
}
