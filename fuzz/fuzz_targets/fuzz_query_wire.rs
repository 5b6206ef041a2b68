#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use querywire::{Bytes, QueryWire, QueryWireOptions, ValueIn, ValueKind, ValueOut, Wire, WireValue};

/// Either raw text for the reader, or a tree that must survive a write and
/// a read unchanged.
#[derive(Debug, Arbitrary)]
enum Input {
    Text { strict_escapes: bool, text: Vec<u8> },
    Tree(Tree),
}

#[derive(Debug, Arbitrary)]
enum Tree {
    Leaf(String),
    Sequence(Vec<Tree>),
    Structured(Vec<(String, Tree)>),
}

impl Tree {
    fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Sequence(items) => 1 + items.iter().map(Self::depth).max().unwrap_or(0),
            Self::Structured(fields) => 1 + fields.iter().map(|(_, item)| item.depth()).max().unwrap_or(0),
        }
    }

    /// An empty name reads back as an unnamed field, so empty names are replaced.
    fn into_value(self) -> WireValue {
        match self {
            Self::Leaf(text) => WireValue::Text(text),
            Self::Sequence(items) => WireValue::Sequence(items.into_iter().map(Self::into_value).collect()),
            Self::Structured(fields) => WireValue::Structured(
                fields
                    .into_iter()
                    .map(|(name, item)| (if name.is_empty() { "_".into() } else { name }, item.into_value()))
                    .collect(),
            ),
        }
    }
}

fn read_all(text: &[u8], strict_escapes: bool) {
    let options = QueryWireOptions {
        strict_escapes,
        ..Default::default()
    };
    let mut wire = QueryWire::wrap(Bytes::from_text(&String::from_utf8_lossy(text)), options);
    let mut name = String::new();
    loop {
        let before = wire.bytes().read_position();
        let Ok(mut input) = wire.read_any_field(&mut name) else {
            break;
        };
        if !input.has_next() || input.read_as(ValueKind::Structured, None).is_err() {
            break;
        }
        if wire.bytes().read_position() == before {
            break;
        }
    }
}

fn round_trip(tree: Tree) {
    // The reader refuses nesting past 128 levels.
    if tree.depth() > 128 {
        return;
    }
    let value = tree.into_value();
    let mut wire = QueryWire::new(64 + 12 * format!("{value:?}").len());
    if wire.write("tree").object(&value).is_err() {
        return;
    }
    let read = wire
        .read("tree")
        .and_then(|mut input| input.read_as(ValueKind::Structured, None));
    assert_eq!(read.ok(), Some(value), "wire text: {wire}");
}

fuzz_target!(|input: Input| match input {
    Input::Text { strict_escapes, text } => read_all(&text, strict_escapes),
    Input::Tree(tree) => round_trip(tree),
});
