//! Reads ELAN `.eaf` documents.
//!
//! Only the parts needed to get timed labels out are looked at: the time slots in
//! `TIME_ORDER` and the annotations of every `TIER`. Reference annotations (on symbolic
//! or dependent tiers) get the interval of the annotation they point to.

use std::{collections::HashMap, fs, path::Path};

use roxmltree::Node;

use super::{Annotation, AnnotationDocument, DocumentReader, ReadError, Tier};

/// How many `ANNOTATION_REF` hops to follow before giving up
const MAX_REF_DEPTH: usize = 32;

#[derive(Clone, Copy, Debug, Default)]
pub struct EafReader;

impl DocumentReader for EafReader {
    fn read(&self, path: &Path) -> Result<AnnotationDocument, ReadError> {
        let text = fs::read_to_string(path)?;
        let tiers = parse_tiers(&text)?;
        AnnotationDocument::new(path, tiers)
    }
}

enum Timing<'a> {
    Aligned { start: &'a str, end: &'a str },
    Ref(&'a str),
}

struct RawAnnotation<'a> {
    id: &'a str,
    timing: Timing<'a>,
    label: String,
}

/// Parses the tiers of an ELAN document, in document order
pub fn parse_tiers(text: &str) -> Result<Vec<Tier>, ReadError> {
    let doc = roxmltree::Document::parse(text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "ANNOTATION_DOCUMENT" {
        return Err(ReadError::Malformed(format!(
            "expected ANNOTATION_DOCUMENT as the root, found {}",
            root.tag_name().name()
        )));
    }

    let mut slots: HashMap<&str, Option<u64>> = HashMap::new();
    for slot in children(root, "TIME_ORDER").flat_map(|to| children(to, "TIME_SLOT")) {
        let id = required(slot, "TIME_SLOT_ID")?;
        let value = match slot.attribute("TIME_VALUE") {
            Some(v) => Some(v.trim().parse::<u64>().map_err(|e| {
                ReadError::Malformed(format!("time slot {id} has a bad TIME_VALUE '{v}': {e}"))
            })?),
            None => None,
        };
        slots.insert(id, value);
    }

    let mut raw_tiers = Vec::new();
    let mut aligned: HashMap<&str, (&str, &str)> = HashMap::new();
    let mut refs: HashMap<&str, &str> = HashMap::new();
    for tier in children(root, "TIER") {
        let name = required(tier, "TIER_ID")?;
        let mut raws = Vec::new();
        for annotation in children(tier, "ANNOTATION") {
            let Some(inner) = annotation.children().find(|n| n.is_element()) else {
                continue;
            };
            let raw = parse_annotation(inner)?;
            match raw.timing {
                Timing::Aligned { start, end } => {
                    aligned.insert(raw.id, (start, end));
                }
                Timing::Ref(target) => {
                    refs.insert(raw.id, target);
                }
            }
            raws.push(raw);
        }
        raw_tiers.push((name, raws));
    }

    let mut tiers = Vec::with_capacity(raw_tiers.len());
    for (name, raws) in raw_tiers {
        let mut annotations = Vec::with_capacity(raws.len());
        for raw in raws {
            let (start, end) = match raw.timing {
                Timing::Aligned { start, end } => (start, end),
                Timing::Ref(target) => follow_ref(raw.id, target, &aligned, &refs)?,
            };
            let (Some(start_ms), Some(end_ms)) = (slot_time(&slots, start)?, slot_time(&slots, end)?)
            else {
                log::warn!("Skipping annotation {} on tier '{name}', it is not time aligned", raw.id);
                continue;
            };
            match Annotation::new(start_ms, end_ms, raw.label) {
                Some(a) => annotations.push(a),
                None => log::warn!(
                    "Skipping annotation {} on tier '{name}', it is empty or ends before it starts",
                    raw.id
                ),
            }
        }
        tiers.push(Tier {
            name: name.to_string(),
            annotations,
        });
    }

    Ok(tiers)
}

fn parse_annotation<'a>(node: Node<'a, '_>) -> Result<RawAnnotation<'a>, ReadError> {
    let id = required(node, "ANNOTATION_ID")?;
    let timing = match node.tag_name().name() {
        "ALIGNABLE_ANNOTATION" => Timing::Aligned {
            start: required(node, "TIME_SLOT_REF1")?,
            end: required(node, "TIME_SLOT_REF2")?,
        },
        "REF_ANNOTATION" => Timing::Ref(required(node, "ANNOTATION_REF")?),
        other => {
            return Err(ReadError::Malformed(format!(
                "annotation {id} is of an unknown kind: {other}"
            )))
        }
    };
    let label = children(node, "ANNOTATION_VALUE")
        .next()
        .and_then(|v| v.text())
        .unwrap_or_default()
        .trim()
        .to_string();
    Ok(RawAnnotation { id, timing, label })
}

fn follow_ref<'a>(
    id: &str,
    mut target: &'a str,
    aligned: &HashMap<&'a str, (&'a str, &'a str)>,
    refs: &HashMap<&'a str, &'a str>,
) -> Result<(&'a str, &'a str), ReadError> {
    for _ in 0..MAX_REF_DEPTH {
        if let Some(&slots) = aligned.get(target) {
            return Ok(slots);
        }
        target = *refs.get(target).ok_or_else(|| {
            ReadError::Malformed(format!(
                "annotation {id} refers to the unknown annotation {target}"
            ))
        })?;
    }
    Err(ReadError::Malformed(format!(
        "annotation {id} has a reference chain that is too long or circular"
    )))
}

fn slot_time(slots: &HashMap<&str, Option<u64>>, id: &str) -> Result<Option<u64>, ReadError> {
    slots
        .get(id)
        .copied()
        .ok_or_else(|| ReadError::Malformed(format!("unknown time slot {id}")))
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn required<'a>(node: Node<'a, '_>, attr: &str) -> Result<&'a str, ReadError> {
    node.attribute(attr).ok_or_else(|| {
        ReadError::Malformed(format!(
            "{} is missing the attribute {attr}",
            node.tag_name().name()
        ))
    })
}
