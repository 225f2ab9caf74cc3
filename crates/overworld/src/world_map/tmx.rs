use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use thiserror::Error;

use super::layers::LayerData;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TmxLocation {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for TmxLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmxErrorCode {
    XmlMalformed,
    InvalidRoot,
    MissingAttribute,
    InvalidValue,
    UnsupportedEncoding,
    TileCount,
}

#[derive(Debug, Error)]
pub enum TmxError {
    #[error("failed to read map '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{code:?}: {message} ({location})")]
    Parse {
        code: TmxErrorCode,
        message: String,
        location: TmxLocation,
    },
}

impl TmxError {
    pub fn code(&self) -> Option<TmxErrorCode> {
        match self {
            Self::Read { .. } => None,
            Self::Parse { code, .. } => Some(*code),
        }
    }
}

/// Tile-layer content of a Tiled map. Object groups, tilesets and image layers
/// are not needed by the world core and are skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmxMap {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub layers: Vec<LayerData>,
}

pub fn load_tmx(path: &Path) -> Result<TmxMap, TmxError> {
    let raw = fs::read_to_string(path).map_err(|source| TmxError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_tmx(&raw)
}

/// Parses an orthogonal Tiled map. Supports CSV and plain-XML layer data; invisible
/// layers (`visible="0"`) are dropped, and `<group>` layers are flattened.
pub fn parse_tmx(raw: &str) -> Result<TmxMap, TmxError> {
    let doc = Document::parse(raw).map_err(|error| TmxError::Parse {
        code: TmxErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        location: TmxLocation {
            line: error.pos().row,
            column: error.pos().col,
        },
    })?;

    let root = doc.root_element();
    if root.tag_name().name() != "map" {
        return Err(error_at_node(
            TmxErrorCode::InvalidRoot,
            format!("root element must be <map>, found <{}>", root.tag_name().name()),
            &doc,
            root,
        ));
    }

    let width = required_u32(&doc, root, "width")?;
    let height = required_u32(&doc, root, "height")?;
    let tile_width = required_u32(&doc, root, "tilewidth")?;
    let tile_height = required_u32(&doc, root, "tileheight")?;

    let mut layers = Vec::new();
    collect_layers(&doc, root, &mut layers)?;

    Ok(TmxMap {
        width,
        height,
        tile_width,
        tile_height,
        layers,
    })
}

fn collect_layers(
    doc: &Document<'_>,
    parent: Node<'_, '_>,
    out: &mut Vec<LayerData>,
) -> Result<(), TmxError> {
    for child in parent.children().filter(|node| node.is_element()) {
        match child.tag_name().name() {
            "layer" => {
                if is_visible(child) {
                    out.push(parse_layer(doc, child)?);
                }
            }
            "group" => {
                if is_visible(child) {
                    collect_layers(doc, child, out)?;
                }
            }
            _ => {}
        }
    }
    Ok(())
}

fn is_visible(node: Node<'_, '_>) -> bool {
    node.attribute("visible").map_or(true, |value| value != "0")
}

fn parse_layer(doc: &Document<'_>, node: Node<'_, '_>) -> Result<LayerData, TmxError> {
    let name = node.attribute("name").unwrap_or_default().to_string();
    let width = required_u32(doc, node, "width")?;
    let height = required_u32(doc, node, "height")?;

    let Some(data) = node
        .children()
        .find(|child| child.is_element() && child.tag_name().name() == "data")
    else {
        return Err(error_at_node(
            TmxErrorCode::MissingAttribute,
            format!("layer '{name}' has no <data> element"),
            doc,
            node,
        ));
    };

    let gids = match data.attribute("encoding") {
        Some("csv") => parse_csv_gids(doc, data, &name)?,
        None => parse_xml_gids(doc, data, &name)?,
        Some(other) => {
            return Err(error_at_node(
                TmxErrorCode::UnsupportedEncoding,
                format!("layer '{name}' uses encoding '{other}'; only csv and xml are supported"),
                doc,
                data,
            ))
        }
    };

    LayerData::from_gids(name, width, height, &gids)
        .map_err(|error| error_at_node(TmxErrorCode::TileCount, error.to_string(), doc, data))
}

fn parse_csv_gids(
    doc: &Document<'_>,
    data: Node<'_, '_>,
    layer: &str,
) -> Result<Vec<u32>, TmxError> {
    let text = data.text().unwrap_or_default();
    text.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry.parse::<u32>().map_err(|_| {
                error_at_node(
                    TmxErrorCode::InvalidValue,
                    format!("layer '{layer}' has invalid gid '{entry}'"),
                    doc,
                    data,
                )
            })
        })
        .collect()
}

fn parse_xml_gids(
    doc: &Document<'_>,
    data: Node<'_, '_>,
    layer: &str,
) -> Result<Vec<u32>, TmxError> {
    data.children()
        .filter(|child| child.is_element() && child.tag_name().name() == "tile")
        .map(|tile| match tile.attribute("gid") {
            None => Ok(0),
            Some(value) => value.parse::<u32>().map_err(|_| {
                error_at_node(
                    TmxErrorCode::InvalidValue,
                    format!("layer '{layer}' has invalid gid '{value}'"),
                    doc,
                    tile,
                )
            }),
        })
        .collect()
}

fn required_u32(
    doc: &Document<'_>,
    node: Node<'_, '_>,
    attribute: &str,
) -> Result<u32, TmxError> {
    let element = node.tag_name().name();
    let Some(value) = node.attribute(attribute) else {
        return Err(error_at_node(
            TmxErrorCode::MissingAttribute,
            format!("<{element}> is missing attribute '{attribute}'"),
            doc,
            node,
        ));
    };
    value.trim().parse::<u32>().map_err(|_| {
        error_at_node(
            TmxErrorCode::InvalidValue,
            format!("<{element}> attribute '{attribute}' = '{value}' is not a non-negative integer"),
            doc,
            node,
        )
    })
}

fn error_at_node(
    code: TmxErrorCode,
    message: String,
    doc: &Document<'_>,
    node: Node<'_, '_>,
) -> TmxError {
    let pos = doc.text_pos_at(node.range().start);
    TmxError::Parse {
        code,
        message,
        location: TmxLocation {
            line: pos.row,
            column: pos.col,
        },
    }
}
