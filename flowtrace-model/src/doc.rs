//! JSON program-model document loader.
//!
//! The document is the machine-code slice of the compiler's export:
//! functions with blocks, instructions and loop metadata, architecture
//! delay-slot constants, and optional relation graphs. Block references
//! inside a function (successors, loops) are by block name and resolved
//! to arena handles while building.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;

use crate::builder::ProgramBuilder;
use crate::program::{Address, Arch, BlockId, Program};
use crate::relation::{RelationNode, RelationNodeKind};
use crate::ModelError;

#[derive(Deserialize)]
struct ProgramDoc {
    arch: ArchDoc,
    functions: Vec<FunctionDoc>,
    #[serde(default, rename = "relation-graphs")]
    relation_graphs: Vec<RelationGraphDoc>,
}

#[derive(Deserialize)]
struct ArchDoc {
    #[serde(rename = "call-delay-slots")]
    call_delay_slots: u32,
    #[serde(rename = "return-delay-slots")]
    return_delay_slots: u32,
}

#[derive(Deserialize)]
struct FunctionDoc {
    name: String,
    label: Option<String>,
    blocks: Vec<BlockDoc>,
}

#[derive(Deserialize)]
struct BlockDoc {
    name: String,
    address: Option<Address>,
    #[serde(default)]
    loopnest: u32,
    #[serde(default)]
    loopheader: bool,
    #[serde(default)]
    successors: Vec<String>,
    #[serde(default)]
    loops: Vec<String>,
    #[serde(default)]
    instructions: Vec<InsnDoc>,
}

#[derive(Deserialize)]
struct InsnDoc {
    address: Option<Address>,
    #[serde(default)]
    returns: bool,
    #[serde(default)]
    callees: Vec<String>,
}

#[derive(Deserialize)]
struct RelationGraphDoc {
    function: String,
    nodes: Vec<RelationNodeDoc>,
}

#[derive(Deserialize)]
struct RelationNodeDoc {
    #[serde(rename = "type")]
    kind: String,
    #[serde(rename = "src-block")]
    src_block: Option<String>,
    #[serde(rename = "dst-block")]
    dst_block: Option<String>,
    #[serde(default)]
    successors: Vec<usize>,
}

impl Program {
    /// Load a program model from a JSON document file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        Self::from_json_reader(BufReader::new(File::open(path)?))
    }

    pub fn from_json_reader(reader: impl Read) -> Result<Self, ModelError> {
        let doc: ProgramDoc = serde_json::from_reader(reader)?;
        build(doc)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ModelError> {
        let doc: ProgramDoc = serde_json::from_str(json)?;
        build(doc)
    }
}

fn build(doc: ProgramDoc) -> Result<Program, ModelError> {
    let mut pb = ProgramBuilder::new(Arch {
        call_delay_slots: doc.arch.call_delay_slots,
        return_delay_slots: doc.arch.return_delay_slots,
    });

    // First pass: create everything, remember block ids by (function, name).
    let mut function_ids = HashMap::new();
    let mut block_ids: Vec<HashMap<String, BlockId>> = Vec::new();
    for fdoc in &doc.functions {
        let f = pb.add_function(&fdoc.name);
        if let Some(label) = &fdoc.label {
            pb.set_label(f, label);
        }
        function_ids.insert(fdoc.name.clone(), f);
        let mut names = HashMap::new();
        for bdoc in &fdoc.blocks {
            let b = pb.add_block(f, &bdoc.name);
            if let Some(addr) = bdoc.address {
                pb.block_address(b, addr);
            }
            pb.block_loop_info(b, bdoc.loopnest, bdoc.loopheader);
            for idoc in &bdoc.instructions {
                let i = pb.add_insn(b, idoc.address);
                if idoc.returns {
                    pb.insn_returns(i);
                }
                if !idoc.callees.is_empty() {
                    let callees: Vec<&str> = idoc.callees.iter().map(String::as_str).collect();
                    pb.insn_callees(i, &callees);
                }
            }
            names.insert(bdoc.name.clone(), b);
        }
        block_ids.push(names);
    }

    // Second pass: resolve intra-function block references.
    for (fix, fdoc) in doc.functions.iter().enumerate() {
        let names = &block_ids[fix];
        let resolve = |name: &str| {
            names.get(name).copied().ok_or_else(|| ModelError::UnknownBlock {
                function: fdoc.name.clone(),
                block: name.to_owned(),
            })
        };
        for bdoc in &fdoc.blocks {
            let b = names[&bdoc.name];
            let succs: Vec<BlockId> =
                bdoc.successors.iter().map(|n| resolve(n)).collect::<Result<_, _>>()?;
            pb.block_successors(b, &succs);
            let loops: Vec<BlockId> =
                bdoc.loops.iter().map(|n| resolve(n)).collect::<Result<_, _>>()?;
            pb.block_loops(b, &loops);
        }
    }

    // Relation graphs.
    for rdoc in &doc.relation_graphs {
        let f = *function_ids
            .get(&rdoc.function)
            .ok_or_else(|| ModelError::UnknownFunction(rdoc.function.clone()))?;
        let fix = f.0 as usize;
        let mut nodes = Vec::with_capacity(rdoc.nodes.len());
        for ndoc in &rdoc.nodes {
            let kind = match ndoc.kind.as_str() {
                "entry" => RelationNodeKind::Entry,
                "exit" => RelationNodeKind::Exit,
                "progress" => RelationNodeKind::Progress,
                "src" => RelationNodeKind::Src,
                "dst" => RelationNodeKind::Dst,
                other => return Err(ModelError::UnknownNodeKind(other.to_owned())),
            };
            let dst_block = match &ndoc.dst_block {
                Some(name) => Some(block_ids[fix].get(name).copied().ok_or_else(|| {
                    ModelError::UnknownBlock {
                        function: rdoc.function.clone(),
                        block: name.clone(),
                    }
                })?),
                None => None,
            };
            nodes.push(RelationNode {
                kind,
                src_block: ndoc.src_block.clone(),
                dst_block,
                successors: ndoc.successors.clone(),
            });
        }
        pb.add_relation_graph(f, nodes)?;
    }

    pb.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "arch": { "call-delay-slots": 2, "return-delay-slots": 2 },
        "functions": [
            { "name": "main",
              "blocks": [
                { "name": "bb0", "successors": ["bb1"],
                  "instructions": [ { "address": 256 },
                                    { "address": 260, "callees": ["foo"] } ] },
                { "name": "bb1", "loopnest": 1, "loopheader": true,
                  "loops": ["bb1"], "successors": ["bb1", "bb2"],
                  "instructions": [ { "address": 264 } ] },
                { "name": "bb2",
                  "instructions": [ { "address": 268, "returns": true } ] }
              ] },
            { "name": "foo", "label": "_foo",
              "blocks": [
                { "name": "e", "instructions": [ { "address": 512 } ] }
              ] }
        ],
        "relation-graphs": [
            { "function": "main",
              "nodes": [
                { "type": "entry", "src-block": "bb0", "dst-block": "bb0",
                  "successors": [1] },
                { "type": "progress", "src-block": "loop", "dst-block": "bb1" }
              ] }
        ]
    }"#;

    #[test]
    fn loads_and_resolves_references() {
        let p = Program::from_json_str(DOC).unwrap();
        let main = p.function_by_label("main").unwrap();
        assert_eq!(p.function(main).address, Some(256));
        let bb1 = p.function(main).blocks()[1];
        assert!(p.block(bb1).loopheader);
        assert_eq!(p.block(bb1).loops(), &[bb1]);
        assert_eq!(p.block(bb1).successors().len(), 2);
        // Label lookup prefers the explicit label.
        assert!(p.function_by_label("_foo").is_some());
        assert!(p.function_by_label("foo").is_none());
        // Relation graph resolved against machine blocks.
        let rg = p.relation_graph(main).unwrap();
        assert_eq!(rg.nodes.len(), 2);
        assert_eq!(rg.node(1).dst_block, Some(bb1));
        assert_eq!(p.arch().call_delay_slots, 2);
    }

    #[test]
    fn dangling_successor_is_an_error() {
        let doc = r#"{
            "arch": { "call-delay-slots": 0, "return-delay-slots": 0 },
            "functions": [
                { "name": "f",
                  "blocks": [
                    { "name": "b", "successors": ["nosuch"],
                      "instructions": [ { "address": 0 } ] }
                  ] }
            ]
        }"#;
        match Program::from_json_str(doc) {
            Err(ModelError::UnknownBlock { function, block }) => {
                assert_eq!(function, "f");
                assert_eq!(block, "nosuch");
            }
            other => panic!("expected UnknownBlock, got {other:?}"),
        }
    }
}
