//! Road connectivity queries.
//!
//! Junctions are opaque on the road graph: a link pointing at a junction
//! expands to every road participating in it. Each road id appears once,
//! in first-seen order.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::model::{ElementType, RoadLink, RoadNetwork};

/// Every road participating in a junction: incoming and connecting roads
/// of all connections, deduplicated in first-seen order.
pub fn road_ids_in_junction(network: &RoadNetwork, junction_id: &str) -> Result<Vec<String>> {
    if junction_id == "-1" {
        return Err(Error::Validation(
            "'-1' marks the absence of a junction".to_string(),
        ));
    }
    let junction = network
        .junctions
        .get(junction_id)
        .ok_or_else(|| Error::Validation(format!("unknown junction id '{junction_id}'")))?;

    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    for connection in &junction.connections {
        for id in [&connection.incoming_road, &connection.connecting_road] {
            if seen.insert(id.clone()) {
                ids.push(id.clone());
            }
        }
    }
    Ok(ids)
}

/// Road ids reachable through one link: the linked road itself, or every
/// road of the linked junction.
pub fn linked_road_ids(network: &RoadNetwork, link: &RoadLink) -> Result<Vec<String>> {
    match link.element_type {
        ElementType::Road => Ok(vec![link.element_id.clone()]),
        ElementType::Junction => road_ids_in_junction(network, &link.element_id),
    }
}

/// Road ids a vehicle on `road_id` can continue onto.
///
/// A road inside a junction connects to every road of that junction. A
/// plain road connects through its predecessor and successor links, with
/// junction links expanded; when no junction is involved the road itself
/// is included, so the result always names the reachable component.
pub fn connecting_road_ids(network: &RoadNetwork, road_id: &str) -> Result<Vec<String>> {
    let road = match network.roads.get(road_id) {
        Some(road) => road,
        None => return Ok(Vec::new()),
    };

    if road.junction != "-1" {
        return road_ids_in_junction(network, &road.junction);
    }

    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut expanded_junction = false;
    for link in [&road.predecessor, &road.successor].into_iter().flatten() {
        if link.element_type == ElementType::Junction {
            expanded_junction = true;
        }
        for id in linked_road_ids(network, link)? {
            if seen.insert(id.clone()) {
                ids.push(id);
            }
        }
    }
    if !expanded_junction && seen.insert(road_id.to_string()) {
        ids.push(road_id.to_string());
    }
    Ok(ids)
}
