//! Permanent, system-hosted landmark groups seeded into every session.
//! They never expire, are always open to join, and derive their ids
//! deterministically from the place name.

use crate::orbit::events::{Event, EventKind};
use crate::orbit::state::GeoPoint;
use crate::orbit::utils::slugify;

pub struct Landmark {
    pub name: &'static str,
    pub lat: f64,
    pub lng: f64,
    pub kind: EventKind,
}

pub const LANDMARKS: &[Landmark] = &[
    Landmark { name: "Eiffel Tower", lat: 48.8584, lng: 2.2945, kind: EventKind::Landmark },
    Landmark { name: "Statue of Liberty", lat: 40.6892, lng: -74.0445, kind: EventKind::Landmark },
    Landmark { name: "Great Wall of China", lat: 40.4319, lng: 116.5704, kind: EventKind::Historical },
    Landmark { name: "Taj Mahal", lat: 27.1751, lng: 78.0421, kind: EventKind::Historical },
    Landmark { name: "Machu Picchu", lat: -13.1631, lng: -72.5450, kind: EventKind::Historical },
    Landmark { name: "Grand Canyon", lat: 36.1069, lng: -112.1129, kind: EventKind::Nature },
    Landmark { name: "Mt. Fuji", lat: 35.3606, lng: 138.7274, kind: EventKind::Nature },
    Landmark { name: "Sydney Opera House", lat: -33.8568, lng: 151.2153, kind: EventKind::Landmark },
    Landmark { name: "Burj Khalifa", lat: 25.1972, lng: 55.2744, kind: EventKind::Landmark },
    Landmark { name: "Colosseum", lat: 41.8902, lng: 12.4922, kind: EventKind::Historical },
    Landmark { name: "Pyramids of Giza", lat: 29.9792, lng: 31.1342, kind: EventKind::Historical },
    Landmark { name: "Christ the Redeemer", lat: -22.9519, lng: -43.2105, kind: EventKind::Landmark },
    Landmark { name: "Mona Lisa (Louvre)", lat: 48.8606, lng: 2.3376, kind: EventKind::Historical },
    Landmark { name: "Golden Gate Bridge", lat: 37.8199, lng: -122.4783, kind: EventKind::Landmark },
    Landmark { name: "Mount Everest", lat: 27.9881, lng: 86.9250, kind: EventKind::Nature },
    // Puerto Rico
    Landmark { name: "El Yunque National Forest", lat: 18.3202, lng: -65.7932, kind: EventKind::Nature },
    Landmark { name: "Castillo San Felipe del Morro", lat: 18.4682, lng: -66.1211, kind: EventKind::Historical },
    Landmark { name: "Flamenco Beach (Culebra)", lat: 18.3283, lng: -65.3183, kind: EventKind::Nature },
    Landmark { name: "Bio Bay (Vieques)", lat: 18.0967, lng: -65.4411, kind: EventKind::Nature },
    Landmark { name: "Observatorio de Arecibo", lat: 18.3464, lng: -66.7528, kind: EventKind::Landmark },
    Landmark { name: "Cueva Ventana", lat: 18.3746, lng: -66.6922, kind: EventKind::Nature },
    Landmark { name: "Toro Verde Adventure Park", lat: 18.2934, lng: -66.3860, kind: EventKind::Landmark },
    Landmark { name: "Plaza Las Américas", lat: 18.4225, lng: -66.0736, kind: EventKind::Shopping },
];

/// Host id for landmark groups (also used for store-synthesized messages).
const SYSTEM_HOST: &str = "system";

pub(crate) fn landmark_events() -> Vec<Event> {
    LANDMARKS
        .iter()
        .map(|place| Event {
            id: format!("landmark-{}", slugify(place.name)),
            host_id: SYSTEM_HOST.to_string(),
            title: place.name.to_string(),
            description: format!("Permanent chat group for {}", place.name),
            location: GeoPoint::new(place.lat, place.lng),
            time: "Always Open".to_string(),
            kind: place.kind,
            is_private: false,
            attendees: Vec::new(),
            pending_requests: Vec::new(),
            max_attendees: None,
            city: None,
        })
        .collect()
}
