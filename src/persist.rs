//! Text persistence of fitted models.
//!
//! A model is a `[Kind]` header line followed by `name: [v1, v2, ...]` array
//! lines. Floats are written in their shortest round-trip form, so a model
//! read back predicts bit-for-bit the same as the one written.
//!
//! ```text
//! [DecisionTable]
//! attributes: [0, 3]
//! splits: [6.5, 0.25]
//! indices: [0, 1, 3]
//! predictions: [1.0, 0.0, -2.5]
//! ```
//!
//! Trees are stored in pre-order: `attributes` holds the split attribute of
//! every node (`-1` for a leaf) and `values` its threshold or prediction.
//! Ensembles and forests write a member count followed by their members.

use std::fmt::{Debug, Write as _};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use itertools::Itertools;
use ndarray::{Array1, ArrayView2};

use crate::ensemble::TableEnsemble;
use crate::error::{Error, Result};
use crate::forest::RandomForest;
use crate::table::DecisionTable;
use crate::tree::{PreorderNode, RegressionTree, TreeNode};
use crate::FittedModel;

const TREE_HEADER: &str = "[RegressionTree]";
const TABLE_HEADER: &str = "[DecisionTable]";
const ENSEMBLE_HEADER: &str = "[TableEnsemble]";
const FOREST_HEADER: &str = "[RandomForest]";

#[derive(Debug, Clone, PartialEq)]
pub enum Model {
    Tree(RegressionTree),
    Table(DecisionTable),
    TableEnsemble(TableEnsemble),
    Forest(RandomForest),
}

impl Model {
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        match self {
            Model::Tree(tree) => {
                out.push_str(TREE_HEADER);
                out.push('\n');
                write_tree(&mut out, tree);
            }
            Model::Table(table) => {
                out.push_str(TABLE_HEADER);
                out.push('\n');
                write_table(&mut out, table);
            }
            Model::TableEnsemble(ensemble) => {
                out.push_str(ENSEMBLE_HEADER);
                out.push('\n');
                write_count(&mut out, "tables", ensemble.tables().len());
                for table in ensemble.tables() {
                    write_table(&mut out, table);
                }
            }
            Model::Forest(forest) => {
                out.push_str(FOREST_HEADER);
                out.push('\n');
                write_count(&mut out, "trees", forest.trees().len());
                for tree in forest.trees() {
                    write_tree(&mut out, tree);
                }
            }
        }
        out
    }

    pub fn from_text(text: &str) -> Result<Model> {
        let mut lines = Lines::new(text);
        let (line, header) = lines.next_line()?;
        let model = match header {
            TREE_HEADER => Model::Tree(read_tree(&mut lines)?),
            TABLE_HEADER => Model::Table(read_table(&mut lines)?),
            ENSEMBLE_HEADER => {
                let n = lines.count("tables")?;
                let tables = (0..n).map(|_| read_table(&mut lines)).collect::<Result<_>>()?;
                Model::TableEnsemble(TableEnsemble::new(tables))
            }
            FOREST_HEADER => {
                let n = lines.count("trees")?;
                let trees = (0..n).map(|_| read_tree(&mut lines)).collect::<Result<_>>()?;
                Model::Forest(RandomForest::new(trees))
            }
            other => return Err(Error::parse(line, format!("unknown model header '{other}'"))),
        };
        lines.finish()?;
        Ok(model)
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(self.to_text().as_bytes())?;
        Ok(())
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Model> {
        let mut text = String::new();
        reader.read_to_string(&mut text)?;
        Model::from_text(&text)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Model> {
        Model::read(&mut BufReader::new(File::open(path)?))
    }
}

impl FittedModel for Model {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        match self {
            Model::Tree(m) => m.predict(x),
            Model::Table(m) => m.predict(x),
            Model::TableEnsemble(m) => m.predict(x),
            Model::Forest(m) => m.predict(x),
        }
    }
}

fn write_array<T: Debug>(out: &mut String, name: &str, values: impl IntoIterator<Item = T>) {
    let _ = writeln!(out, "{name}: [{:?}]", values.into_iter().format(", "));
}

fn write_count(out: &mut String, name: &str, n: usize) {
    let _ = writeln!(out, "{name}: {n}");
}

fn write_table(out: &mut String, table: &DecisionTable) {
    write_array(out, "attributes", table.attributes());
    write_array(out, "splits", table.thresholds());
    write_array(out, "indices", table.indices());
    write_array(out, "predictions", table.predictions());
}

fn write_tree(out: &mut String, tree: &RegressionTree) {
    let (attributes, values): (Vec<i64>, Vec<f64>) = tree
        .root()
        .preorder()
        .into_iter()
        .map(|node| match node {
            PreorderNode::Leaf { prediction } => (-1, prediction),
            PreorderNode::Interior {
                attribute,
                threshold,
            } => (attribute as i64, threshold),
        })
        .unzip();
    write_array(out, "attributes", attributes);
    write_array(out, "values", values);
}

fn read_table(lines: &mut Lines<'_>) -> Result<DecisionTable> {
    let (line, attributes) = lines.array::<usize>("attributes")?;
    let (_, thresholds) = lines.array::<f64>("splits")?;
    let (_, indices) = lines.array::<u64>("indices")?;
    let (_, predictions) = lines.array::<f64>("predictions")?;
    DecisionTable::new(attributes, thresholds, indices, predictions).map_err(|e| match e {
        Error::InvalidInput(message) => Error::parse(line, message),
        other => other,
    })
}

fn read_tree(lines: &mut Lines<'_>) -> Result<RegressionTree> {
    let (line, attributes) = lines.array::<i64>("attributes")?;
    let (_, values) = lines.array::<f64>("values")?;
    if attributes.len() != values.len() {
        return Err(Error::parse(
            line,
            format!("{} attributes but {} values", attributes.len(), values.len()),
        ));
    }
    if let Some(value) = values.iter().find(|v| !v.is_finite()) {
        return Err(Error::parse(line, format!("tree value {value} is not finite")));
    }
    let nodes = attributes
        .into_iter()
        .zip(values)
        .map(|(attribute, value)| match attribute {
            -1 => Ok(PreorderNode::Leaf { prediction: value }),
            a if a >= 0 => Ok(PreorderNode::Interior {
                attribute: a as usize,
                threshold: value,
            }),
            a => Err(Error::parse(line, format!("bad node attribute {a}"))),
        })
        .collect::<Result<Vec<_>>>()?;
    let root = TreeNode::from_preorder(&nodes).map_err(|e| match e {
        Error::InvalidInput(message) => Error::parse(line, message),
        other => other,
    })?;
    Ok(RegressionTree::new(root))
}

/// Non-blank lines with their 1-based line numbers.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
    last: usize,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
            last: 0,
        }
    }

    fn next_line(&mut self) -> Result<(usize, &'a str)> {
        for (i, line) in self.inner.by_ref() {
            self.last = i + 1;
            let line = line.trim();
            if !line.is_empty() {
                return Ok((i + 1, line));
            }
        }
        Err(Error::parse(self.last + 1, "unexpected end of input"))
    }

    /// The value of a `name: value` line.
    fn field(&mut self, name: &str) -> Result<(usize, &'a str)> {
        let (line, text) = self.next_line()?;
        match text.split_once(':') {
            Some((key, value)) if key.trim() == name => Ok((line, value.trim())),
            _ => Err(Error::parse(line, format!("expected '{name}: ...', got '{text}'"))),
        }
    }

    fn count(&mut self, name: &str) -> Result<usize> {
        let (line, value) = self.field(name)?;
        value
            .parse()
            .map_err(|_| Error::parse(line, format!("bad count '{value}'")))
    }

    fn array<T: FromStr>(&mut self, name: &str) -> Result<(usize, Vec<T>)> {
        let (line, value) = self.field(name)?;
        let inner = value
            .strip_prefix('[')
            .and_then(|v| v.strip_suffix(']'))
            .ok_or_else(|| Error::parse(line, format!("'{name}' is not a bracketed list")))?;
        if inner.trim().is_empty() {
            return Ok((line, Vec::new()));
        }
        let values = inner
            .split(',')
            .map(|item| {
                let item = item.trim();
                item.parse()
                    .map_err(|_| Error::parse(line, format!("bad value '{item}' in '{name}'")))
            })
            .collect::<Result<_>>()?;
        Ok((line, values))
    }

    fn finish(&mut self) -> Result<()> {
        match self.next_line() {
            Ok((line, text)) => Err(Error::parse(line, format!("unexpected trailing content '{text}'"))),
            Err(_) => Ok(()),
        }
    }
}
