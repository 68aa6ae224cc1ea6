#![allow(dead_code)]

use rowmodel::prelude::*;
use rowmodel_memory::MemoryStore;
use serde_json::{Value as Json, json};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// External storage the attachment attributes write to.
#[derive(Default)]
pub struct Files {
    files: Mutex<BTreeMap<u64, String>>,
    next: AtomicU64,
    released: AtomicUsize,
    set_null: AtomicUsize,
}

impl Files {
    pub fn count(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    pub fn set_null_calls(&self) -> usize {
        self.set_null.load(Ordering::SeqCst)
    }

    fn write(&self, id: Option<u64>, content: &str) -> u64 {
        let id = id.unwrap_or_else(|| self.next.fetch_add(1, Ordering::SeqCst) + 1);
        self.files.lock().unwrap().insert(id, content.to_string());
        id
    }

    fn read(&self, id: u64) -> Option<String> {
        self.files.lock().unwrap().get(&id).cloned()
    }

    fn remove(&self, id: u64) {
        if self.files.lock().unwrap().remove(&id).is_some() {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A text attachment kept in [`Files`]; the row stores `{"file": id}`.
///
/// With `deferred` set, an emptied attachment is not released on store:
/// it persists as `{"pending": id}` until the row is deleted.
struct Attachment {
    file: Option<u64>,
    zombie: bool,
    deferred: bool,
    files: Arc<Files>,
}

impl ObjectAttr for Attachment {
    fn get(&self) -> Json {
        if self.zombie {
            return Json::Null;
        }
        self.file
            .and_then(|id| self.files.read(id))
            .map_or(Json::Null, Json::String)
    }

    fn set(mut self: Box<Self>, value: &Json) -> Result<AttrState> {
        match value.as_str() {
            Some(content) if !content.is_empty() => {
                self.file = Some(self.files.write(self.file, content));
                self.zombie = false;
                Ok(AttrState::Live(self))
            }
            _ => {
                self.files.set_null.fetch_add(1, Ordering::SeqCst);
                if self.file.is_some() {
                    self.zombie = true;
                    Ok(AttrState::Zombie(self))
                } else {
                    Ok(AttrState::Gone)
                }
            }
        }
    }

    fn errors_preventing_store(&self) -> Result<Vec<String>> {
        match self.get().as_str() {
            Some("forbidden") => Ok(vec!["attachment content is forbidden".to_string()]),
            Some("explode") => Err(Error::Custom("attachment check blew up".to_string())),
            _ => Ok(Vec::new()),
        }
    }

    fn to_store(&mut self) -> Result<Json> {
        match (self.file, self.zombie) {
            (Some(id), true) if self.deferred => Ok(json!({ "pending": id })),
            (Some(id), true) => {
                self.files.remove(id);
                self.file = None;
                Ok(Json::Null)
            }
            (Some(id), false) => Ok(json!({ "file": id })),
            (None, _) => Ok(Json::Null),
        }
    }

    fn delete(&mut self) -> Result<()> {
        if let Some(id) = self.file.take() {
            self.files.remove(id);
        }
        Ok(())
    }
}

pub struct AttachmentType {
    id: &'static str,
    deferred: bool,
    files: Arc<Files>,
}

impl AttachmentType {
    pub fn new(files: &Arc<Files>) -> Arc<Self> {
        Arc::new(Self {
            id: "attachment",
            deferred: false,
            files: Arc::clone(files),
        })
    }

    pub fn deferred(files: &Arc<Files>) -> Arc<Self> {
        Arc::new(Self {
            id: "deferred",
            deferred: true,
            files: Arc::clone(files),
        })
    }
}

impl ObjectAttrType for AttachmentType {
    fn id(&self) -> &str {
        self.id
    }

    fn create(&self) -> Box<dyn ObjectAttr> {
        Box::new(Attachment {
            file: None,
            zombie: false,
            deferred: self.deferred,
            files: Arc::clone(&self.files),
        })
    }

    fn from_store(&self, stored: Json) -> Result<Box<dyn ObjectAttr>> {
        let (file, zombie) = match (stored.get("file"), stored.get("pending")) {
            (Some(id), _) => (id.as_u64(), false),
            (None, Some(id)) => (id.as_u64(), true),
            (None, None) => (None, false),
        };
        Ok(Box::new(Attachment {
            file,
            zombie,
            deferred: self.deferred,
            files: Arc::clone(&self.files),
        }))
    }
}

/// Music catalogue tables:
/// `Artist <- Album <- Track <- Play`, `Album <-> Tag` through `AlbumTag`,
/// `Album <- Review` and `Album <- Note`.
pub fn music_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    store
        .create_table("Artist", &[("name", "VARCHAR(40)")])
        .unwrap();
    store
        .create_table(
            "Album",
            &[
                ("title", "VARCHAR(20)"),
                ("year", "INTEGER"),
                ("liner", "TEXT"),
                ("meta", "JSON"),
                ("cover", "JSON"),
                ("photos", "JSON"),
                ("fkArtist", "INTEGER"),
            ],
        )
        .unwrap();
    store
        .create_table("Track", &[("title", "TEXT"), ("pos", "INTEGER"), ("fkAlbum", "INTEGER")])
        .unwrap();
    store
        .create_table("Play", &[("at", "INTEGER"), ("fkTrack", "INTEGER")])
        .unwrap();
    store
        .create_table("Review", &[("stars", "INTEGER"), ("fkAlbum", "INTEGER")])
        .unwrap();
    store
        .create_table("Note", &[("text", "TEXT"), ("fkAlbum", "INTEGER")])
        .unwrap();
    store.create_table("Tag", &[("label", "TEXT")]).unwrap();
    store
        .create_table("AlbumTag", &[("fkAlbum", "INTEGER"), ("fkTag", "INTEGER"), ("rank", "INTEGER")])
        .unwrap();
    Arc::new(store)
}

/// Everything a test needs: the registry, the store behind it and the
/// attachment files.
pub struct Music {
    pub registry: Arc<Registry>,
    pub store: Arc<MemoryStore>,
    pub files: Arc<Files>,
}

impl Music {
    pub fn factory(&self, model: &str) -> Arc<Factory> {
        self.registry.factory(model).unwrap()
    }

    pub fn create(&self, model: &str, values: &[(&str, Value)]) -> Instance {
        let mut instance = self
            .factory(model)
            .new_instance(values.iter().map(|(k, v)| (*k, v.clone())))
            .unwrap();
        instance.store(false).unwrap();
        instance
    }

    pub fn count(&self, model: &str) -> u64 {
        self.factory(model).count(None).unwrap()
    }
}

/// Register the music models. `album` customizes the Album definition.
pub fn music_with(album: impl FnOnce(ModelOptions) -> ModelOptions) -> Music {
    let store = music_store();
    let registry = Registry::new(Arc::clone(&store) as Arc<dyn RowStore>);
    let files = Arc::new(Files::default());
    registry.register_object_type(AttachmentType::new(&files));
    registry.register_object_type(AttachmentType::deferred(&files));

    registry
        .register(
            ModelOptions::new("Artist")
                .has_many(HasManyOptions::new("Album").name("Albums").on_delete(OnDelete::Cascade)),
        )
        .unwrap();
    registry
        .register(album(
            ModelOptions::new("Album")
                .json("meta")
                .object("cover", "attachment")
                .object_array("photos", "attachment", 0)
                .belongs_to(BelongsToOptions::new("Artist"))
                .has_many(
                    HasManyOptions::new("Track")
                        .name("Tracks")
                        .on_delete(OnDelete::Cascade),
                )
                .has_many(HasManyOptions::new("Review").name("Reviews"))
                .has_many(
                    HasManyOptions::new("Note")
                        .name("Notes")
                        .on_delete(OnDelete::SetNull),
                )
                .has_many(HasManyOptions::new("Tag").name("Tags").through("AlbumTag")),
        ))
        .unwrap();
    registry
        .register(
            ModelOptions::new("Track")
                .compare_keys(["pos"])
                .belongs_to(BelongsToOptions::new("Album"))
                .has_many(HasManyOptions::new("Play").name("Plays")),
        )
        .unwrap();
    registry.register(ModelOptions::new("Play")).unwrap();
    registry.register(ModelOptions::new("Review")).unwrap();
    registry.register(ModelOptions::new("Note")).unwrap();
    registry
        .register(ModelOptions::new("Tag").compare_keys(["label"]))
        .unwrap();
    registry
        .register(ModelOptions::new("AlbumTag").compare_keys(["rank"]))
        .unwrap();

    Music {
        registry,
        store,
        files,
    }
}

pub fn music() -> Music {
    music_with(|album| album)
}
