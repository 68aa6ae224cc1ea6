//! Delete propagation against the in-memory store.

mod common;

use common::{music, music_with};
use rowmodel::prelude::*;
use rowmodel_memory::MemoryStore;
use serde_json::json;
use std::sync::Arc;

fn text(s: &str) -> Value {
    Value::from(s)
}

#[test]
fn cascade_removes_every_level() {
    let m = music();
    let mut artist = m.create("Artist", &[("name", text("Nina"))]);
    for title in ["One", "Two"] {
        let album = artist
            .new_related("Albums", [("title", text(title))])
            .and_then(|mut a| a.store(false).map(|()| a))
            .unwrap();
        for pos in 1..=3_i64 {
            let mut track = album
                .new_related("Tracks", [("pos", Value::from(pos))])
                .unwrap();
            track.store(false).unwrap();
        }
    }
    assert_eq!(m.count("Album"), 2);
    assert_eq!(m.count("Track"), 6);

    artist.delete(false).unwrap();

    assert_eq!(artist.state(), InstanceState::Deleted);
    assert_eq!(m.count("Artist"), 0);
    assert_eq!(m.count("Album"), 0);
    assert_eq!(m.count("Track"), 0);
    assert!(!m.store.in_transaction());
}

#[test]
fn restrict_deep_in_the_tree_blocks_and_reports_path() {
    let m = music();
    let mut artist = m.create("Artist", &[("name", text("Nina"))]);
    let mut album = artist.new_related("Albums", [("title", text("One"))]).unwrap();
    album.store(false).unwrap();
    let mut track = album.new_related("Tracks", [("pos", Value::from(1_i64))]).unwrap();
    track.store(false).unwrap();
    let mut play = track.new_related("Plays", [("at", Value::from(100_i64))]).unwrap();
    play.store(false).unwrap();

    let err = artist.delete(false).unwrap_err();

    assert!(err.is_restricted());
    assert_eq!(
        err.restrict_path().unwrap(),
        ["Albums", "Tracks", "Plays"].map(String::from)
    );
    assert!(matches!(&err, Error::Restricted(r) if r.model == "Artist"));
    assert_eq!(artist.state(), InstanceState::Persisted);
    assert_eq!(m.count("Artist"), 1);
    assert_eq!(m.count("Album"), 1);
    assert_eq!(m.count("Track"), 1);
    assert_eq!(m.count("Play"), 1);
}

#[test]
fn restrict_directly_on_the_deleted_row() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    let mut review = album.new_related("Reviews", [("stars", Value::from(4_i64))]).unwrap();
    review.store(false).unwrap();

    let err = album.delete(false).unwrap_err();
    assert_eq!(err.restrict_path().unwrap(), ["Reviews".to_string()]);
    assert_eq!(m.count("Album"), 1);

    review.delete(false).unwrap();
    album.delete(false).unwrap();
    assert_eq!(m.count("Album"), 0);
}

#[test]
fn forced_delete_removes_restricted_rows() {
    let m = music();
    let mut artist = m.create("Artist", &[("name", text("Nina"))]);
    let mut album = artist.new_related("Albums", [("title", text("One"))]).unwrap();
    album.store(false).unwrap();
    let mut track = album.new_related("Tracks", [("pos", Value::from(1_i64))]).unwrap();
    track.store(false).unwrap();
    for at in [1_i64, 2, 3] {
        let mut play = track.new_related("Plays", [("at", Value::from(at))]).unwrap();
        play.store(false).unwrap();
    }
    let mut review = album.new_related("Reviews", [("stars", Value::from(2_i64))]).unwrap();
    review.store(false).unwrap();

    artist.delete(true).unwrap();

    for model in ["Artist", "Album", "Track", "Play", "Review"] {
        assert_eq!(m.count(model), 0, "{} rows left", model);
    }
}

#[test]
fn set_null_keeps_children_and_clears_their_key() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    for body in ["a", "b"] {
        let mut note = album.new_related("Notes", [("text", text(body))]).unwrap();
        note.store(false).unwrap();
    }
    let other = m.create("Album", &[("title", text("Two"))]);
    let mut kept = other.new_related("Notes", [("text", text("c"))]).unwrap();
    kept.store(false).unwrap();

    album.delete(false).unwrap();

    let notes = m.factory("Note");
    assert_eq!(notes.count(None).unwrap(), 3);
    assert_eq!(notes.count(Some(&Filter::is_null("fkAlbum"))).unwrap(), 2);
    kept.reload().unwrap();
    assert_eq!(kept.value("fkAlbum"), &Value::from(other.id().unwrap()));
}

#[test]
fn through_association_loses_join_rows_only() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    let rock = m.create("Tag", &[("label", text("rock"))]);
    let live = m.create("Tag", &[("label", text("live"))]);
    album.connect("Tags", &rock).unwrap();
    album.connect("Tags", &live).unwrap();
    assert_eq!(m.count("AlbumTag"), 2);

    album.delete(false).unwrap();

    assert_eq!(m.count("AlbumTag"), 0);
    assert_eq!(m.count("Tag"), 2);
}

#[test]
fn failed_write_rolls_back_the_whole_cascade() {
    let m = music();
    let mut artist = m.create("Artist", &[("name", text("Nina"))]);
    let mut album = artist.new_related("Albums", [("title", text("One"))]).unwrap();
    album.store(false).unwrap();
    for pos in 1..=2_i64 {
        let mut track = album.new_related("Tracks", [("pos", Value::from(pos))]).unwrap();
        track.store(false).unwrap();
    }

    // Tracks are erased before their album, so the failure hits mid-cascade.
    m.store.fail_next_write("Album");
    let err = artist.delete(false).unwrap_err();

    assert!(matches!(err, Error::Query(_)));
    assert!(!m.store.in_transaction());
    assert_eq!(artist.state(), InstanceState::Persisted);
    assert_eq!(m.count("Artist"), 1);
    assert_eq!(m.count("Album"), 1);
    assert_eq!(m.count("Track"), 2);

    artist.delete(false).unwrap();
    assert_eq!(m.count("Track"), 0);
}

struct KeepTitled(&'static str);

impl ModelHooks for KeepTitled {
    fn before_delete(&self, instance: &Instance) -> Result<()> {
        if instance.value("title") == &Value::from(self.0) {
            return Err(Error::Custom(format!("'{}' is protected", self.0)));
        }
        Ok(())
    }
}

#[test]
fn before_delete_hook_vetoes_cascade() {
    let m = music_with(|album| album.hooks(Arc::new(KeepTitled("Keep"))));
    let mut artist = m.create("Artist", &[("name", text("Nina"))]);
    for title in ["Drop", "Keep"] {
        let mut album = artist.new_related("Albums", [("title", text(title))]).unwrap();
        album.store(false).unwrap();
    }

    let err = artist.delete(false).unwrap_err();

    assert!(matches!(&err, Error::Custom(msg) if msg.contains("protected")));
    assert_eq!(m.count("Album"), 2);
    assert_eq!(m.count("Artist"), 1);
}

#[test]
fn cascade_releases_object_attributes() {
    let m = music();
    let mut artist = m.create("Artist", &[("name", text("Nina"))]);
    let mut album = artist.new_related("Albums", [("title", text("One"))]).unwrap();
    album.set_attr("cover", json!("front.png")).unwrap();
    album
        .set_attr("photos", json!(["a.jpg", "b.jpg", "c.jpg"]))
        .unwrap();
    album.store(false).unwrap();
    assert_eq!(m.files.count(), 4);

    artist.delete(false).unwrap();

    assert_eq!(m.files.count(), 0);
    assert_eq!(m.files.released(), 4);
}

#[test]
fn deleting_twice_or_unsaved_is_a_no_op() {
    let m = music();
    let mut album = m.create("Album", &[("title", text("One"))]);
    album.delete(false).unwrap();
    album.delete(false).unwrap();
    assert_eq!(album.state(), InstanceState::Deleted);

    let mut unsaved = m
        .factory("Album")
        .new_instance([("title", text("Two"))])
        .unwrap();
    unsaved.delete(false).unwrap();
    assert_eq!(unsaved.state(), InstanceState::New);
}

#[test]
fn views_refuse_writes() {
    let m = music();
    m.create("Album", &[("title", text("One"))]);
    m.store.create_view("AlbumView", "Album").unwrap();
    let view = m
        .registry
        .register(ModelOptions::new("AlbumView").view(true))
        .unwrap();

    let mut found = view.find(&Filter::All, &FindOptions::default()).unwrap();
    assert_eq!(found.len(), 1);
    assert!(matches!(found[0].delete(false), Err(Error::Config(_))));
    assert!(matches!(found[0].store(false), Err(Error::Config(_))));
    assert_eq!(m.count("Album"), 1);
}

#[test]
fn cyclic_rows_terminate() {
    let store = MemoryStore::new();
    store
        .create_table("Node", &[("label", "TEXT"), ("fkNode", "INTEGER")])
        .unwrap();
    let registry = Registry::new(Arc::new(store));
    let nodes = registry
        .register(
            ModelOptions::new("Node").has_many(
                HasManyOptions::new("Node")
                    .name("Children")
                    .on_delete(OnDelete::Cascade),
            ),
        )
        .unwrap();

    let mut a = nodes.new_instance([("label", text("a"))]).unwrap();
    a.store(false).unwrap();
    let mut b = a.new_related("Children", [("label", text("b"))]).unwrap();
    b.store(false).unwrap();
    a.set("fkNode", b.id().unwrap()).unwrap();
    a.store(false).unwrap();

    a.delete(false).unwrap();

    assert_eq!(nodes.count(None).unwrap(), 0);
}
