use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use tracing::info;

use crate::app::{BlockOverrides, EntityKind, WorldState, BLOCK_TILES_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownElement,
    UnknownAttribute,
    MissingAttribute,
    InvalidValue,
    UnknownEntityKind,
}

#[derive(Debug, Clone)]
pub struct LevelError {
    pub code: LevelErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for LevelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (file={}, line={}, column={})",
                self.code,
                self.message,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (file={})",
                self.code,
                self.message,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for LevelError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelEntity {
    pub kind: EntityKind,
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LevelBlock {
    pub x: f32,
    pub y: f32,
    pub sprite: String,
    pub overrides: BlockOverrides,
}

/// What a level places into a fresh world: entities first, then blocks, each in
/// document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelDef {
    pub entities: Vec<LevelEntity>,
    pub blocks: Vec<LevelBlock>,
}

impl LevelDef {
    pub fn builtin_start() -> Self {
        Self {
            entities: vec![
                LevelEntity {
                    kind: EntityKind::Dummy,
                    x: 0.0,
                    y: 0.0,
                },
                LevelEntity {
                    kind: EntityKind::Player,
                    x: 0.0,
                    y: 0.0,
                },
            ],
            blocks: vec![LevelBlock {
                x: 64.0,
                y: 64.0,
                sprite: String::new(),
                overrides: BlockOverrides {
                    tiles_x: Some(5),
                    ..BlockOverrides::default()
                },
            }],
        }
    }

    pub fn load(file_path: &Path) -> Result<Self, LevelError> {
        let raw = fs::read_to_string(file_path).map_err(|error| LevelError {
            code: LevelErrorCode::ReadFile,
            message: format!("failed to read level: {error}"),
            file_path: file_path.to_path_buf(),
            location: None,
        })?;
        Self::parse(file_path, &raw)
    }

    pub fn parse(file_path: &Path, raw: &str) -> Result<Self, LevelError> {
        let doc = Document::parse(raw).map_err(|error| LevelError {
            code: LevelErrorCode::XmlMalformed,
            message: format!("malformed XML: {error}"),
            file_path: file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            }),
        })?;
        let parser = LevelParser {
            file_path,
            doc: &doc,
        };

        let root = doc.root_element();
        if root.tag_name().name() != "Level" {
            return Err(parser.error_at_node(
                LevelErrorCode::InvalidRoot,
                "root element must be <Level>".to_string(),
                root,
            ));
        }

        let mut level = LevelDef::default();
        for child in root.children().filter(|node| node.is_element()) {
            match child.tag_name().name() {
                "Entity" => level.entities.push(parser.parse_entity(child)?),
                "Block" => level.blocks.push(parser.parse_block(child)?),
                other => {
                    return Err(parser.error_at_node(
                        LevelErrorCode::UnknownElement,
                        format!("unsupported element <{other}>; expected <Entity> or <Block>"),
                        child,
                    ));
                }
            }
        }
        Ok(level)
    }

    /// Spawns entities and adds blocks to `world`, enqueueing every block
    /// sprite with the world's asset loader.
    pub fn apply(&self, world: &mut WorldState) {
        for entity in &self.entities {
            world.spawn_kind(entity.kind, entity.x, entity.y);
        }
        for block in &self.blocks {
            if !block.sprite.is_empty() {
                world.assets_mut().enqueue(block.sprite.clone());
            }
            world.add_block(block.x, block.y, block.sprite.clone(), block.overrides);
        }
        info!(
            entity_count = self.entities.len(),
            block_count = self.blocks.len(),
            "level_applied"
        );
    }
}

struct LevelParser<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl LevelParser<'_, '_> {
    fn parse_entity(&self, node: Node<'_, '_>) -> Result<LevelEntity, LevelError> {
        self.reject_unknown_attributes(node, &["kind", "x", "y"])?;
        let kind_name = node.attribute("kind").ok_or_else(|| {
            self.error_at_node(
                LevelErrorCode::MissingAttribute,
                "missing required attribute 'kind' on <Entity>".to_string(),
                node,
            )
        })?;
        let kind = EntityKind::from_str(kind_name).map_err(|_| {
            self.error_at_node(
                LevelErrorCode::UnknownEntityKind,
                format!("unknown entity kind '{kind_name}'"),
                node,
            )
        })?;
        Ok(LevelEntity {
            kind,
            x: self.coordinate(node, "x")?,
            y: self.coordinate(node, "y")?,
        })
    }

    fn parse_block(&self, node: Node<'_, '_>) -> Result<LevelBlock, LevelError> {
        self.reject_unknown_attributes(
            node,
            &[
                "x",
                "y",
                "sprite",
                "tileWidth",
                "tileHeight",
                "tilesX",
                "tilesY",
                "collidable",
            ],
        )?;
        let overrides = BlockOverrides {
            tile_width: self.optional_value::<f32>(node, "tileWidth")?,
            tile_height: self.optional_value::<f32>(node, "tileHeight")?,
            tiles_x: self.optional_value::<u32>(node, "tilesX")?,
            tiles_y: self.optional_value::<u32>(node, "tilesY")?,
            collidable: self.optional_value::<bool>(node, "collidable")?,
        };
        for (name, value) in [
            ("tileWidth", overrides.tile_width),
            ("tileHeight", overrides.tile_height),
        ] {
            if value.is_some_and(|size| !size.is_finite() || size <= 0.0) {
                return Err(self.error_at_node(
                    LevelErrorCode::InvalidValue,
                    format!("{name} must be finite and > 0"),
                    node,
                ));
            }
        }
        for (name, value) in [("tilesX", overrides.tiles_x), ("tilesY", overrides.tiles_y)] {
            if value.is_some_and(|count| count == 0 || count > BLOCK_TILES_MAX) {
                return Err(self.error_at_node(
                    LevelErrorCode::InvalidValue,
                    format!("{name} must be between 1 and {BLOCK_TILES_MAX}"),
                    node,
                ));
            }
        }
        Ok(LevelBlock {
            x: self.coordinate(node, "x")?,
            y: self.coordinate(node, "y")?,
            sprite: node.attribute("sprite").unwrap_or_default().trim().to_string(),
            overrides,
        })
    }

    fn coordinate(&self, node: Node<'_, '_>, name: &str) -> Result<f32, LevelError> {
        let value = self.optional_value::<f32>(node, name)?.unwrap_or(0.0);
        if !value.is_finite() {
            return Err(self.error_at_node(
                LevelErrorCode::InvalidValue,
                format!("{name} must be finite"),
                node,
            ));
        }
        Ok(value)
    }

    fn optional_value<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
    ) -> Result<Option<T>, LevelError> {
        let Some(raw) = node.attribute(name) else {
            return Ok(None);
        };
        raw.trim().parse::<T>().map(Some).map_err(|_| {
            self.error_at_node(
                LevelErrorCode::InvalidValue,
                format!("{name} '{raw}' is not a valid value"),
                node,
            )
        })
    }

    fn reject_unknown_attributes(
        &self,
        node: Node<'_, '_>,
        allowed: &[&str],
    ) -> Result<(), LevelError> {
        match node
            .attributes()
            .find(|attribute| !allowed.contains(&attribute.name()))
        {
            Some(attribute) => Err(self.error_at_node(
                LevelErrorCode::UnknownAttribute,
                format!(
                    "unknown attribute '{}' on <{}>",
                    attribute.name(),
                    node.tag_name().name()
                ),
                node,
            )),
            None => Ok(()),
        }
    }

    fn error_at_node(&self, code: LevelErrorCode, message: String, node: Node<'_, '_>) -> LevelError {
        let pos = self.doc.text_pos_at(node.range().start);
        LevelError {
            code,
            message,
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::app::{Vec2, WorldConfig};
    use crate::content::AssetLoader;

    fn parse(raw: &str) -> Result<LevelDef, LevelError> {
        LevelDef::parse(Path::new("levels/test.xml"), raw)
    }

    #[test]
    fn start_document_matches_builtin_level() {
        let level = parse(
            r#"<Level>
                <Entity kind="dummy" x="0" y="0"/>
                <Entity kind="player" x="0" y="0"/>
                <Block x="64" y="64" sprite="" tilesX="5"/>
            </Level>"#,
        )
        .expect("parse");

        assert_eq!(level, LevelDef::builtin_start());
    }

    #[test]
    fn block_attributes_map_onto_overrides() {
        let level = parse(
            r#"<Level><Block x="1.5" y="-2" sprite=" sprites/wall.png " tileWidth="16" tileHeight="8" tilesY="3" collidable="true"/></Level>"#,
        )
        .expect("parse");

        let block = &level.blocks[0];
        assert_eq!((block.x, block.y), (1.5, -2.0));
        assert_eq!(block.sprite, "sprites/wall.png");
        assert_eq!(
            block.overrides,
            BlockOverrides {
                tile_width: Some(16.0),
                tile_height: Some(8.0),
                tiles_x: None,
                tiles_y: Some(3),
                collidable: Some(true),
            }
        );
    }

    #[test]
    fn unknown_kind_reports_location() {
        let err = parse("<Level>\n  <Entity kind=\"dragon\"/>\n</Level>").expect_err("err");

        assert_eq!(err.code, LevelErrorCode::UnknownEntityKind);
        assert_eq!(err.location, Some(SourceLocation { line: 2, column: 3 }));
        assert!(err.to_string().contains("levels/test.xml"));
    }

    #[test]
    fn invalid_root_errors() {
        let err = parse("<Defs/>").expect_err("err");
        assert_eq!(err.code, LevelErrorCode::InvalidRoot);
    }

    #[test]
    fn unknown_element_errors() {
        let err = parse("<Level><Tree/></Level>").expect_err("err");
        assert_eq!(err.code, LevelErrorCode::UnknownElement);
    }

    #[test]
    fn unknown_attribute_errors() {
        let err = parse(r#"<Level><Entity kind="dummy" z="1"/></Level>"#).expect_err("err");
        assert_eq!(err.code, LevelErrorCode::UnknownAttribute);
    }

    #[test]
    fn missing_kind_errors() {
        let err = parse(r#"<Level><Entity x="1"/></Level>"#).expect_err("err");
        assert_eq!(err.code, LevelErrorCode::MissingAttribute);
    }

    #[test]
    fn bad_numbers_error() {
        for raw in [
            r#"<Level><Entity kind="dummy" x="left"/></Level>"#,
            r#"<Level><Entity kind="dummy" x="NaN"/></Level>"#,
            r#"<Level><Block tilesX="-1"/></Level>"#,
            r#"<Level><Block tilesX="0"/></Level>"#,
            r#"<Level><Block tilesY="4000000000"/></Level>"#,
            r#"<Level><Block tilesY="4097"/></Level>"#,
            r#"<Level><Block tileWidth="0"/></Level>"#,
            r#"<Level><Block collidable="yes"/></Level>"#,
        ] {
            let err = parse(raw).expect_err(raw);
            assert_eq!(err.code, LevelErrorCode::InvalidValue, "raw={raw}");
        }
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = parse("<Level><Entity kind=\"dummy\"></Level>").expect_err("err");
        assert_eq!(err.code, LevelErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn load_reads_file_from_disk() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("start.xml");
        fs::write(&path, r#"<Level><Entity kind="player" x="3" y="4"/></Level>"#).expect("write");

        let level = LevelDef::load(&path).expect("load");

        assert_eq!(
            level.entities,
            vec![LevelEntity {
                kind: EntityKind::Player,
                x: 3.0,
                y: 4.0
            }]
        );
    }

    #[test]
    fn load_missing_file_reports_read_error() {
        let temp = TempDir::new().expect("temp");
        let err = LevelDef::load(&temp.path().join("absent.xml")).expect_err("err");
        assert_eq!(err.code, LevelErrorCode::ReadFile);
        assert!(err.location.is_none());
    }

    #[test]
    fn apply_builds_world_and_enqueues_sprites() {
        let mut world = WorldState::new(WorldConfig::default(), AssetLoader::new("assets"));
        let mut level = LevelDef::builtin_start();
        level.blocks.push(LevelBlock {
            x: 0.0,
            y: 0.0,
            sprite: "sprites/wall.png".to_string(),
            overrides: BlockOverrides::default(),
        });

        level.apply(&mut world);

        let kinds = world
            .entities()
            .entities()
            .iter()
            .map(|entity| entity.kind())
            .collect::<Vec<_>>();
        assert_eq!(kinds, vec![EntityKind::Dummy, EntityKind::Player]);
        assert_eq!(world.tiles().len(), 2);
        assert_eq!(world.tiles().blocks()[0].position(), Vec2::new(64.0, 64.0));
        assert_eq!(world.tiles().blocks()[0].properties().tiles_x, 5);
        assert_eq!(world.assets().queued_len(), 1);
        assert!(world.camera().subject().is_some());
    }
}
