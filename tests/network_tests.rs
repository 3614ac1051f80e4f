//! End-to-end tests over a small but complete road network: two through
//! roads joined by a junction with one connecting road.

use std::io::Write;

use roadweave::{boundary, connect, parse, resolve, transform};

/// Road 1 runs 100 m east into junction 5; road 2 connects it to road 3.
const TOWN: &str = r#"<?xml version="1.0"?>
<OpenDRIVE>
    <road name="Main" length="100.0" id="1" junction="-1">
        <link>
            <successor elementType="junction" elementId="5"/>
        </link>
        <planView>
            <geometry s="0.0" x="0.0" y="0.0" hdg="0.0" length="100.0">
                <line/>
            </geometry>
        </planView>
        <elevationProfile>
            <elevation s="0.0" a="0.0" b="0.01" c="0.0" d="0.0"/>
        </elevationProfile>
        <lanes>
            <laneSection s="0.0">
                <left>
                    <lane id="1" type="driving" level="false">
                        <width sOffset="0.0" a="3.5" b="0.0" c="0.0" d="0.0"/>
                    </lane>
                </left>
                <center>
                    <lane id="0" type="driving" level="false"/>
                </center>
                <right>
                    <lane id="-1" type="driving" level="false">
                        <width sOffset="0.0" a="3.5" b="0.0" c="0.0" d="0.0"/>
                    </lane>
                </right>
            </laneSection>
        </lanes>
        <signals>
            <signal s="90.0" t="-5.0" id="7" name="Entry" dynamic="yes" orientation="+"
                    zOffset="2.0" type="1000001" subtype="-1" value="-1"/>
        </signals>
    </road>
    <road name="Connector" length="20.0" id="2" junction="5">
        <link>
            <predecessor elementType="road" elementId="1" contactPoint="end"/>
            <successor elementType="road" elementId="3" contactPoint="start"/>
        </link>
        <planView>
            <geometry s="0.0" x="100.0" y="0.0" hdg="0.0" length="20.0">
                <line/>
            </geometry>
        </planView>
        <lanes>
            <laneSection s="0.0">
                <center>
                    <lane id="0" type="driving" level="false"/>
                </center>
                <right>
                    <lane id="-1" type="driving" level="false">
                        <width sOffset="0.0" a="3.5" b="0.0" c="0.0" d="0.0"/>
                    </lane>
                </right>
            </laneSection>
        </lanes>
    </road>
    <road name="Side" length="50.0" id="3" junction="-1">
        <link>
            <predecessor elementType="junction" elementId="5"/>
        </link>
        <planView>
            <geometry s="0.0" x="120.0" y="0.0" hdg="0.0" length="50.0">
                <line/>
            </geometry>
        </planView>
        <lanes>
            <laneOffset s="0.0" a="1.0" b="0.0" c="0.0" d="0.0"/>
            <laneSection s="0.0">
                <center>
                    <lane id="0" type="driving" level="false"/>
                </center>
                <right>
                    <lane id="-1" type="driving" level="false">
                        <width sOffset="0.0" a="3.0" b="0.0" c="0.0" d="0.0"/>
                    </lane>
                </right>
            </laneSection>
        </lanes>
    </road>
    <junction id="5" name="J">
        <connection id="0" incomingRoad="1" connectingRoad="2" contactPoint="start">
            <laneLink from="-1" to="-1"/>
        </connection>
    </junction>
</OpenDRIVE>"#;

#[test]
fn load_from_file() {
    let mut file = tempfile::Builder::new().suffix(".xodr").tempfile().unwrap();
    file.write_all(TOWN.as_bytes()).unwrap();

    let network = parse::load(file.path()).unwrap();
    assert_eq!(network.roads_count(), 3);
    assert_eq!(network.junctions.len(), 1);
    assert_eq!(network.signals.len(), 1);
    assert_eq!(network.roads["1"].name, "Main");
}

#[test]
fn unknown_extension_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
    file.write_all(TOWN.as_bytes()).unwrap();
    assert!(parse::load(file.path()).is_err());
}

#[test]
fn json_snapshot_round_trips_through_files() {
    let network = parse::parse_xodr(TOWN).unwrap();

    let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    file.write_all(parse::to_json(&network).unwrap().as_bytes())
        .unwrap();

    let back = parse::load(file.path()).unwrap();
    assert_eq!(network, back);
}

#[test]
fn one_invalid_road_rejects_the_whole_document() {
    // road 3's geometry shortened so its length no longer matches
    let broken = TOWN.replace(
        r#"<geometry s="0.0" x="120.0" y="0.0" hdg="0.0" length="50.0">"#,
        r#"<geometry s="0.0" x="120.0" y="0.0" hdg="0.0" length="40.0">"#,
    );
    assert!(parse::parse_xodr(&broken).is_err());
}

#[test]
fn network_resolves_without_diagnostics() {
    let network = parse::parse_xodr(TOWN).unwrap();
    let (resolved, diagnostics) = resolve::resolve_network(&network);
    assert!(diagnostics.is_empty());
    assert_eq!(resolved.len(), 3);

    // road 1's only segment ends where its successor road begins; the
    // junction link leaves the end open instead
    assert_eq!(resolved["1"].len(), 1);
    assert_eq!(resolved["1"][0].ex, None);

    // road 2 meets road 3 at its start
    assert_eq!(resolved["2"][0].ex, Some(120.0));
    assert_eq!(resolved["2"][0].ey, Some(0.0));

    // road 3 carries its lane offset
    assert_eq!(resolved["3"][0].offset.unwrap().a, 1.0);
}

#[test]
fn boundaries_follow_widths_and_offsets() {
    let network = parse::parse_xodr(TOWN).unwrap();
    let (resolved, _) = resolve::resolve_network(&network);
    let (boundaries, diagnostics) = boundary::network_boundaries(&network, &resolved);
    assert!(diagnostics.is_empty());

    let main = &boundaries["1"][0];
    assert_eq!(main.left.len(), 1);
    assert_eq!(main.right.len(), 1);
    let outer = main.left[0]
        .outer
        .iter()
        .find(|p| (p.x - 10.0).abs() < 1e-6)
        .unwrap();
    assert!((outer.y - 3.5).abs() < 1e-9);
    // borders ride the elevation profile
    assert!((outer.z - 0.1).abs() < 1e-9);

    // road 3's lanes hang off the offset reference line: inner at +1,
    // outer 3 m to the right of it
    let side = &boundaries["3"][0];
    let inner = side.right[0].inner[0];
    let outer = side.right[0].outer[0];
    assert!((inner.y - 1.0).abs() < 1e-9);
    assert!((outer.y + 2.0).abs() < 1e-9);
}

#[test]
fn pose_on_the_main_road() {
    let network = parse::parse_xodr(TOWN).unwrap();
    let road = &network.roads["1"];

    let pose = transform::track_to_inertial(road, 50.0, 0.0, 0.0).unwrap();
    assert!((pose.position.x - 50.0).abs() < 1e-9);
    assert!((pose.position.z - 0.5).abs() < 1e-9);
    assert!((pose.rotation.pitch + 0.01f64.atan()).abs() < 1e-9);
    assert_eq!(pose.rotation.yaw, 0.0);
}

#[test]
fn signal_pose_uses_track_anchoring() {
    let network = parse::parse_xodr(TOWN).unwrap();
    let signal = &network.signals["7"];
    let road = &network.roads[&signal.road_id];

    let pose = transform::signal_pose(road, signal).unwrap();
    assert!((pose.position.x - 90.0).abs() < 1e-9);
    assert!((pose.position.y + 5.0).abs() < 1e-9);
    // zOffset on top of the elevation at s = 90
    assert!((pose.position.z - (0.9 + 2.0)).abs() < 1e-9);
}

#[test]
fn connectivity_expands_the_junction() {
    let network = parse::parse_xodr(TOWN).unwrap();

    // road 1 ends in the junction: reachable set is the junction's roads
    let ids = connect::connecting_road_ids(&network, "1").unwrap();
    assert_eq!(ids, vec!["1", "2"]);

    // the connecting road belongs to the junction outright
    let ids = connect::connecting_road_ids(&network, "2").unwrap();
    assert_eq!(ids, vec!["1", "2"]);

    // road 3 reaches back through the junction
    let ids = connect::connecting_road_ids(&network, "3").unwrap();
    assert_eq!(ids, vec!["1", "2"]);

    assert!(connect::connecting_road_ids(&network, "404").unwrap().is_empty());
}
