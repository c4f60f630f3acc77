//! Google Maps link helpers.

use crate::requests::Stop;

const DIRECTIONS_BASE: &str = "https://www.google.com/maps/dir";
const SEARCH_BASE: &str = "https://www.google.com/maps/search/?api=1&query=";

/// Directions link between two `lat,lng` coordinate pairs.
pub fn directions_url(from: &str, to: &str) -> String {
    format!("{}/{}/{}", DIRECTIONS_BASE, compact(from), compact(to))
}

/// Search link that drops a pin on a `lat,lng` coordinate pair.
pub fn search_url(coordinates: &str) -> String {
    format!("{}{}", SEARCH_BASE, compact(coordinates))
}

/// Fill `path_to_next` on every stop but the last, which is cleared.
pub fn link_stops(stops: &mut [Stop]) {
    let next: Vec<Option<String>> = stops
        .iter()
        .skip(1)
        .map(|s| Some(s.google_map_coordinates.clone()))
        .chain(std::iter::once(None))
        .collect();

    for (stop, next) in stops.iter_mut().zip(next) {
        stop.path_to_next = next.map(|to| directions_url(&stop.google_map_coordinates, &to));
    }
}

fn compact(coordinates: &str) -> String {
    coordinates.split_whitespace().collect()
}
