use quill_types::Codec;

/// How many rows a terminal expects, and what the caller gets back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Cardinality {
    /// Any number of rows; returns them all.
    All,
    /// Exactly one row; fails on zero and on more than one.
    One,
    /// Zero or one row; fails on more than one.
    MaybeOne,
    /// At least one row; returns the first.
    First,
    /// Any number of rows; returns the first when present.
    MaybeFirst,
}

/// Result-reconstruction plan: a tree mirroring the final selection that
/// tells the shaper how to assemble nested output from flat rows.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Plan {
    /// One result column parsed through a codec.
    Scalar { column: String, codec: Codec },
    /// An object assembled from sub-plans over the same row.
    Record { fields: Vec<(String, Plan)> },
    /// One result column holding JSON text, parsed and then shaped.
    Json { column: String, shape: JsonShape },
    /// A left-joined subtree: when every result column the inner plan reads
    /// is SQL NULL, the whole subtree is `null`.
    Nullable { inner: Box<Plan> },
}

impl Plan {
    /// The result-column names this plan reads, in plan order.
    #[must_use]
    pub fn columns(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_columns(&mut out);
        out
    }

    fn collect_columns<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Scalar { column, .. } | Self::Json { column, .. } => out.push(column),
            Self::Record { fields } => {
                for (_, plan) in fields {
                    plan.collect_columns(out);
                }
            }
            Self::Nullable { inner } => inner.collect_columns(out),
        }
    }
}

/// Shape of a value inside a JSON-encoded result column.
///
/// `json_group_array(json_object(...))` projections arrive as one text cell;
/// this tree drives their client-side decomposition.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum JsonShape {
    /// A leaf value parsed through a codec.
    Scalar(Codec),
    /// A JSON object with a fixed field list.
    Object(Vec<(String, JsonShape)>),
    /// A JSON array of uniformly shaped elements.
    Array(Box<JsonShape>),
    /// A subtree that collapses to `null` when it is JSON `null` or an
    /// object whose values are all `null` (a left join with no match).
    Nullable(Box<JsonShape>),
}
