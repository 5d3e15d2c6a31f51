//! The minimal view of the schema catalog the compiler needs.
//!
//! The concrete catalog (populated from SQLite's `pragma_table_info` and
//! `pragma_foreign_key_list`) lives in `restlite_core::schema`, which is the
//! only thing that implements `SchemaView`. Defining the trait down here,
//! rather than depending on `restlite-core` from this crate, is what lets
//! `restlite-core` depend on `restlite-sql` without a cycle.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    pub is_pk: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub pk_columns: Vec<String>,
}

impl TableInfo {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

/// One foreign key edge, directed from the table holding the FK columns to
/// the table it references.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ForeignKey {
    pub constraint_name: String,
    pub from_table: String,
    pub from_columns: Vec<String>,
    pub to_table: String,
    pub to_columns: Vec<String>,
}

#[derive(Debug)]
pub enum RelationshipError {
    TableNotFound(String),
    NoRelationship { parent: String, child: String },
    UnknownHint { child: String, hint: String, candidates: Vec<String> },
}

/// A read-only view over tables and their foreign keys, queried by the
/// compiler while resolving embeds and validating filter/order columns.
pub trait SchemaView {
    fn table(&self, name: &str) -> Option<&TableInfo>;

    /// All foreign keys touching `table` in either direction (as the
    /// referencing side or the referenced side).
    fn foreign_keys_for(&self, table: &str) -> Vec<&ForeignKey>;

    /// Resolve an embed from `parent` to `child`, disambiguated by an
    /// optional `table!fk_column` hint. Returns the FK edge and whether the
    /// parent is the referencing (many-to-one) or referenced (one-to-many)
    /// side.
    fn find_relationship(
        &self,
        parent: &str,
        child: &str,
        hint: Option<&str>,
    ) -> Result<(&ForeignKey, bool), RelationshipError> {
        let _ = self.table(parent).ok_or_else(|| RelationshipError::TableNotFound(parent.to_string()))?;
        self.table(child).ok_or_else(|| RelationshipError::TableNotFound(child.to_string()))?;

        let mut candidates: Vec<(&ForeignKey, bool)> = Vec::new();
        for fk in self.foreign_keys_for(parent) {
            if fk.from_table == parent && fk.to_table == child {
                candidates.push((fk, true));
            }
        }
        for fk in self.foreign_keys_for(child) {
            if fk.from_table == child && fk.to_table == parent {
                candidates.push((fk, false));
            }
        }

        if let Some(hint) = hint {
            let all_names: Vec<String> = candidates
                .iter()
                .map(|(fk, _)| fk.constraint_name.clone())
                .collect();
            candidates.retain(|(fk, _)| {
                fk.constraint_name == hint || fk.from_columns.iter().any(|c| c == hint)
            });
            if candidates.is_empty() {
                return Err(RelationshipError::UnknownHint {
                    child: child.to_string(),
                    hint: hint.to_string(),
                    candidates: all_names,
                });
            }
        }

        match candidates.len() {
            0 => Err(RelationshipError::NoRelationship {
                parent: parent.to_string(),
                child: child.to_string(),
            }),
            1 => Ok(candidates.into_iter().next().unwrap()),
            _ => {
                // Ambiguous without a hint: pick the first FK in catalog
                // iteration order rather than erroring, deterministically.
                Ok(candidates.into_iter().next().unwrap())
            }
        }
    }
}
