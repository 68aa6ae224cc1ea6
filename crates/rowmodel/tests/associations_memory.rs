//! Has-many and belongs-to associations against the in-memory store.

mod common;

use common::{Music, music, music_with};
use rowmodel::prelude::*;

fn text(s: &str) -> Value {
    Value::from(s)
}

fn album_with_tracks(m: &Music, positions: &[i64]) -> Instance {
    let album = m.create("Album", &[("title", text("One"))]);
    for pos in positions {
        let mut track = album
            .new_related("Tracks", [("pos", Value::from(*pos))])
            .unwrap();
        track.store(false).unwrap();
    }
    album
}

fn positions(instances: &[Instance]) -> Vec<i64> {
    instances
        .iter()
        .map(|t| t.get::<i64>("pos").unwrap())
        .collect()
}

fn labels(instances: &[Instance]) -> Vec<String> {
    instances
        .iter()
        .map(|t| t.get::<String>("label").unwrap())
        .collect()
}

#[test]
fn resolved_association_defaults() {
    let m = music();
    let albums = m.factory("Album");

    let tracks = albums.has_many_named("Tracks").unwrap();
    assert_eq!(tracks.foreign_key, "fkAlbum");
    assert_eq!(tracks.on_delete, Some(OnDelete::Cascade));
    assert_eq!(tracks.remote_key, None);

    let reviews = albums.has_many_named("Reviews").unwrap();
    assert_eq!(reviews.on_delete, Some(OnDelete::Restrict));

    let tags = albums.has_many_named("Tags").unwrap();
    assert!(tags.is_through());
    assert_eq!(tags.on_delete, None);
    assert_eq!(tags.remote_key.as_deref(), Some("fkTag"));
    assert_eq!(tags.foreign_key, "fkAlbum");

    let artist = &albums.belongs_to()[0];
    assert_eq!(artist.name, "artist");
    assert_eq!(artist.foreign_key, "fkArtist");
}

#[test]
fn through_options_are_validated() {
    let m = music();
    let stray_key = ModelOptions::new("Critique")
        .table("Review")
        .has_many(HasManyOptions::new("Track").remote_key("fkTrack"));
    assert!(matches!(m.registry.register(stray_key), Err(Error::Config(_))));

    let stray_sort = ModelOptions::new("Critique")
        .table("Review")
        .has_many(HasManyOptions::new("Track").join_sort(true));
    assert!(matches!(m.registry.register(stray_sort), Err(Error::Config(_))));
    assert!(!m.registry.contains("Critique"));
}

#[test]
fn direct_find_sorted_and_new() {
    let m = music();
    let mut album = album_with_tracks(&m, &[3, 1, 2]);
    let id = Value::from(album.id().unwrap());

    let found = album.find_related("Tracks", &Filter::All).unwrap();
    assert_eq!(found.len(), 3);
    assert!(found.iter().all(|t| t.value("fkAlbum") == &id));

    let sorted = album.sorted_related("Tracks", &Filter::All).unwrap();
    assert_eq!(positions(sorted), vec![1, 2, 3]);

    let later = album
        .sorted_related("Tracks", &Filter::gt("pos", 1_i64))
        .unwrap();
    assert_eq!(positions(later), vec![2, 3]);

    let fresh = album
        .new_related("Tracks", [("title", text("Coda"))])
        .unwrap();
    assert_eq!(fresh.state(), InstanceState::New);
    assert_eq!(fresh.value("fkAlbum"), &id);
}

#[test]
fn association_results_are_cached_per_instance() {
    let m = music();
    let mut album = album_with_tracks(&m, &[1, 2]);
    assert_eq!(album.find_related("Tracks", &Filter::All).unwrap().len(), 2);

    let mut extra = album
        .new_related("Tracks", [("pos", Value::from(3_i64))])
        .unwrap();
    extra.store(false).unwrap();

    assert_eq!(album.find_related("Tracks", &Filter::All).unwrap().len(), 2);
    album.clear_attrs();
    assert_eq!(album.find_related("Tracks", &Filter::All).unwrap().len(), 3);
}

#[test]
fn sorted_without_remote_ordering_fails() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    assert!(matches!(
        album.sorted_related("Reviews", &Filter::All),
        Err(Error::Config(_))
    ));
}

#[test]
fn new_related_needs_a_stored_owner_and_a_direct_association() {
    let m = music();
    let unsaved = m
        .factory("Album")
        .new_instance([("title", text("Draft"))])
        .unwrap();
    assert!(matches!(
        unsaved.new_related("Tracks", Vec::<(String, Value)>::new()),
        Err(Error::Config(_))
    ));

    let album = m.create("Album", &[("title", text("One"))]);
    assert!(matches!(
        album.new_related("Tags", [("label", text("x"))]),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        album.new_related("Nope", Vec::<(String, Value)>::new()),
        Err(Error::Config(_))
    ));
}

#[test]
fn through_connect_sorted_and_disconnect() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    let rock = m.create("Tag", &[("label", text("rock"))]);
    let jazz = m.create("Tag", &[("label", text("jazz"))]);
    let ambient = m.create("Tag", &[("label", text("ambient"))]);
    m.create("Tag", &[("label", text("unused"))]);

    for tag in [&rock, &jazz, &ambient] {
        album.connect("Tags", tag).unwrap();
    }
    album.connect("Tags", &rock).unwrap();
    assert_eq!(m.count("AlbumTag"), 3);

    let sorted = album.sorted_related("Tags", &Filter::All).unwrap();
    assert_eq!(labels(sorted), vec!["ambient", "jazz", "rock"]);

    let filtered = album
        .find_related("Tags", &Filter::ne("label", "jazz"))
        .unwrap();
    assert_eq!(filtered.len(), 2);

    album.disconnect("Tags", &jazz).unwrap();
    assert_eq!(m.count("AlbumTag"), 2);
    assert_eq!(m.count("Tag"), 4);
    let sorted = album.sorted_related("Tags", &Filter::All).unwrap();
    assert_eq!(labels(sorted), vec!["ambient", "rock"]);
}

#[test]
fn connect_rejects_direct_associations() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    let track = m.create("Track", &[("pos", Value::from(1_i64))]);
    assert!(matches!(album.connect("Tracks", &track), Err(Error::Config(_))));
}

#[test]
fn join_sort_orders_by_the_join_rows() {
    let m = music_with(|album| {
        album.has_many(
            HasManyOptions::new("Tag")
                .name("RankedTags")
                .through("AlbumTag")
                .join_sort(true),
        )
    });
    let mut album = m.create("Album", &[("title", text("One"))]);
    let ranked = [("b", 2_i64), ("a", 3), ("c", 1)];
    for (label, _) in ranked {
        let tag = m.create("Tag", &[("label", text(label))]);
        album.connect("RankedTags", &tag).unwrap();
    }

    let joins = m.factory("AlbumTag");
    let links = joins.find(&Filter::All, &FindOptions::new()).unwrap();
    for (mut link, (_, rank)) in links.into_iter().zip(ranked) {
        link.set("rank", rank).unwrap();
        link.store(false).unwrap();
    }

    let by_rank = album.sorted_related("RankedTags", &Filter::All).unwrap();
    assert_eq!(labels(by_rank), vec!["c", "b", "a"]);
    let by_label = album.sorted_related("Tags", &Filter::All).unwrap();
    assert_eq!(labels(by_label), vec!["a", "b", "c"]);
}

#[test]
fn accessor_dispatch() {
    let m = music();
    let mut album = album_with_tracks(&m, &[2, 1]);

    let names = album.factory().accessor_names();
    for expected in ["findTracks", "sortedTracks", "newTracks", "findTags", "sortedTags"] {
        assert!(names.contains(&expected), "missing {}", expected);
    }
    assert!(!names.contains(&"newTags"));

    match album.call("sortedTracks", &Filter::All, Vec::new()).unwrap() {
        Related::Many(tracks) => assert_eq!(positions(tracks), vec![1, 2]),
        other => panic!("unexpected {:?}", other),
    }
    match album
        .call(
            "newTracks",
            &Filter::All,
            vec![("pos".to_string(), Value::from(9_i64))],
        )
        .unwrap()
    {
        Related::New(track) => {
            assert_eq!(track.model(), "Track");
            assert_eq!(track.get::<i64>("pos").unwrap(), 9);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(matches!(
        album.call("deleteTracks", &Filter::All, Vec::new()),
        Err(Error::Config(_))
    ));
}

#[test]
fn belongs_to_get_and_set() {
    let m = music();
    let album = m.create("Album", &[("title", text("One"))]);
    let other = m.create("Album", &[("title", text("Two"))]);
    let mut track = album
        .new_related("Tracks", [("pos", Value::from(1_i64))])
        .unwrap();
    track.store(false).unwrap();

    let owner = track.belongs_to("album").unwrap().unwrap();
    assert_eq!(owner.id(), album.id());

    track.set_belongs_to("album", Some(&other)).unwrap();
    track.store(false).unwrap();
    assert_eq!(track.belongs_to("album").unwrap().unwrap().id(), other.id());

    let tag = m.create("Tag", &[("label", text("x"))]);
    assert!(matches!(
        track.set_belongs_to("album", Some(&tag)),
        Err(Error::Config(_))
    ));

    track.set_belongs_to("album", None).unwrap();
    assert_eq!(track.value("fkAlbum"), &Value::Null);
    assert!(track.belongs_to("album").unwrap().is_none());
    assert!(matches!(track.belongs_to("artist"), Err(Error::Config(_))));
}

#[test]
fn dangling_belongs_to_blocks_store() {
    let m = music();
    let mut track = m
        .factory("Track")
        .new_instance([("pos", Value::from(1_i64))])
        .unwrap();
    track.set_belongs_to_id("album", Some(999)).unwrap();

    let errors = track.errors_preventing_store();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.errors[0].field, "fkAlbum");
    assert_eq!(errors.messages(), vec!["Album 999 does not exist"]);
    assert!(matches!(track.store(false), Err(Error::Validation(_))));
    assert_eq!(m.count("Track"), 0);

    let album = m.create("Album", &[("title", text("One"))]);
    track.set_belongs_to("album", Some(&album)).unwrap();
    track.store(false).unwrap();
    assert_eq!(m.count("Track"), 1);

    track.set("fkAlbum", "x").unwrap();
    let errors = track.errors_preventing_store();
    assert!(errors.messages()[0].contains("not a valid Album id"));

    track.set_belongs_to_id("album", None).unwrap();
    assert!(track.errors_preventing_store().is_empty());
}
