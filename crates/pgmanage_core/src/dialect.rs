//! Static per-engine metadata consumed by DDL builders and tree loaders.
//!
//! Each [`Dialect`] resolves to a read-only [`DialectInfo`]. Engine-specific
//! SQL-builder behavior (index rename, column drop, nullability, column rename,
//! default-constraint removal) lives on `Dialect` as methods.

use crate::error::ClientError;
use crate::models::Technology;

/// A target database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// PostgreSQL
    Postgresql,
    /// SQLite
    Sqlite,
    /// MySQL and MariaDB
    Mysql,
    /// Microsoft SQL Server
    Mssql,
}

/// Builder features an engine may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// ALTER COLUMN statements
    AlterColumn,
    /// Several statements in one execution
    MultiStatement,
    /// Composite primary keys added after creation
    MultiPrimaryKeys,
    /// Renaming an index
    RenameIndex,
    /// Choosing an index access method
    IndexMethod,
    /// Partial index predicates
    IndexPredicate,
    /// Adding a foreign key to an existing table
    AddForeignKey,
    /// Dropping a foreign key
    DropForeignKey,
}

/// Features disabled for an engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisabledFeatures {
    pub alter_column: bool,
    pub multi_statement: bool,
    pub multi_primary_keys: bool,
    pub rename_index: bool,
    pub index_method: bool,
    pub index_predicate: bool,
    pub add_foreign_key: bool,
    pub drop_foreign_key: bool,
}

impl DisabledFeatures {
    const NONE: Self = Self {
        alter_column: false,
        multi_statement: false,
        multi_primary_keys: false,
        rename_index: false,
        index_method: false,
        index_predicate: false,
        add_foreign_key: false,
        drop_foreign_key: false,
    };

    /// Whether a feature is disabled.
    pub fn contains(&self, feature: Feature) -> bool {
        match feature {
            Feature::AlterColumn => self.alter_column,
            Feature::MultiStatement => self.multi_statement,
            Feature::MultiPrimaryKeys => self.multi_primary_keys,
            Feature::RenameIndex => self.rename_index,
            Feature::IndexMethod => self.index_method,
            Feature::IndexPredicate => self.index_predicate,
            Feature::AddForeignKey => self.add_foreign_key,
            Feature::DropForeignKey => self.drop_foreign_key,
        }
    }
}

/// REST endpoints used by DDL modals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiEndpoints {
    pub schemas_url: Option<&'static str>,
    pub types_url: Option<&'static str>,
    pub indexes_url: &'static str,
    pub table_definition_url: &'static str,
    pub foreign_keys_url: &'static str,
}

/// Read-only descriptor of an engine.
#[derive(Debug, PartialEq, Eq)]
pub struct DialectInfo {
    /// Column types offered in DDL modals
    pub data_types: &'static [&'static str],
    /// Types rendered right-aligned as numbers
    pub numeric_types: &'static [&'static str],
    /// Index access methods
    pub index_methods: &'static [&'static str],
    /// Special index kinds
    pub index_types: &'static [&'static str],
    /// Extra filter operators
    pub operators: &'static [&'static str],
    /// Objects live in schemas
    pub has_schema: bool,
    /// Objects carry comments
    pub has_comments: bool,
    /// SQL formatter language
    pub formatter_dialect: &'static str,
    /// REST endpoints
    pub api_endpoints: ApiEndpoints,
    /// Disabled builder features
    pub disabled_features: DisabledFeatures,
}

static POSTGRES: DialectInfo = DialectInfo {
    data_types: &[
        "serial", "smallserial", "bigserial", "int", "int2", "int4", "int8", "smallint", "integer",
        "bigint", "decimal", "numeric", "real", "float", "float4", "float8", "double precision",
        "money", "character varying", "varchar", "character", "char", "text", "citext", "hstore",
        "bytea", "bit", "varbit", "bit varying", "timetz", "timestamptz", "timestamp",
        "timestamp without time zone", "timestamp with time zone", "date", "time",
        "time without time zone", "time with time zone", "interval", "bool", "boolean", "enum",
        "point", "line", "lseg", "box", "path", "polygon", "circle", "cidr", "inet", "macaddr",
        "tsvector", "tsquery", "uuid", "xml", "json", "jsonb", "int4range", "int8range", "numrange",
        "tsrange", "tstzrange", "daterange", "geometry", "geography", "cube", "ltree",
    ],
    numeric_types: &[
        "smallint", "integer", "bigint", "decimal", "numeric", "real", "double precision", "serial",
        "bigserial",
    ],
    index_methods: &["btree", "hash", "gist", "spgist", "gin", "brin"],
    index_types: &[],
    operators: &["ilike"],
    has_schema: true,
    has_comments: true,
    formatter_dialect: "postgresql",
    api_endpoints: ApiEndpoints {
        schemas_url: Some("/get_schemas_postgresql/"),
        types_url: Some("/get_types_postgresql/"),
        indexes_url: "/get_indexes_postgresql/",
        table_definition_url: "/get_table_definition_postgresql/",
        foreign_keys_url: "/get_fks_postgresql/",
    },
    disabled_features: DisabledFeatures::NONE,
};

static SQLITE: DialectInfo = DialectInfo {
    data_types: &[
        "int", "int2", "int8", "integer", "tinyint", "smallint", "mediumint", "bigint", "decimal",
        "numeric", "float", "double", "real", "double precision", "datetime", "varying character",
        "character", "native character", "varchar", "nchar", "nvarchar2", "unsigned big int",
        "boolean", "blob", "text", "clob", "date",
    ],
    numeric_types: &[],
    index_methods: &[],
    index_types: &[],
    operators: &[],
    has_schema: false,
    has_comments: false,
    formatter_dialect: "sqlite",
    api_endpoints: ApiEndpoints {
        schemas_url: None,
        types_url: None,
        indexes_url: "/get_indexes_sqlite/",
        table_definition_url: "/get_table_definition_sqlite/",
        foreign_keys_url: "/get_fks_sqlite/",
    },
    disabled_features: DisabledFeatures {
        alter_column: true,
        multi_statement: true,
        multi_primary_keys: true,
        rename_index: true,
        index_method: true,
        index_predicate: false,
        add_foreign_key: true,
        drop_foreign_key: true,
    },
};

static MYSQL: DialectInfo = DialectInfo {
    data_types: &[
        "bit", "int", "int unsigned", "integer", "integer unsigned", "tinyint", "tinyint unsigned",
        "smallint", "smallint unsigned", "mediumint", "mediumint unsigned", "bigint",
        "bigint unsigned", "float", "double", "double precision", "dec", "decimal", "numeric",
        "fixed", "bool", "boolean", "date", "datetime", "timestamp", "time", "year", "char", "nchar",
        "national char", "varchar", "nvarchar", "national varchar", "text", "tinytext",
        "mediumtext", "blob", "longtext", "tinyblob", "mediumblob", "longblob", "enum", "set",
        "json", "binary", "varbinary", "geometry", "point", "linestring", "polygon", "multipoint",
        "multilinestring", "multipolygon", "geometrycollection",
    ],
    // driver type names, not column types
    numeric_types: &[
        "decimal", "tiny", "short", "long", "float", "double", "int24", "longlong", "newdecimal",
    ],
    index_methods: &[],
    index_types: &["fulltext", "spatial"],
    operators: &[],
    has_schema: false,
    has_comments: true,
    formatter_dialect: "mysql",
    api_endpoints: ApiEndpoints {
        schemas_url: None,
        types_url: None,
        indexes_url: "/get_indexes_mysql/",
        table_definition_url: "/get_table_definition_mysql/",
        foreign_keys_url: "/get_fks_mysql/",
    },
    disabled_features: DisabledFeatures {
        index_predicate: true,
        index_method: true,
        rename_index: true,
        ..DisabledFeatures::NONE
    },
};

static MSSQL: DialectInfo = DialectInfo {
    data_types: &[
        "int", "bigint", "binary", "bit", "char", "date", "datetime", "datetime2",
        "datetimeoffset", "decimal", "float", "ntext", "numeric", "nvarchar", "real",
        "smalldatetime", "smallint", "smallmoney", "text", "time", "timestamp", "tinyint",
        "uniqueidentifier", "varbinary", "varchar", "xml", "sql_variant", "hierarchyid",
        "geography", "geometry", "rowversion", "money", "image", "nchar",
    ],
    numeric_types: &[
        "bigint", "int", "smallint", "tinyint", "decimal", "numeric", "float", "real", "money",
        "smallmoney",
    ],
    index_methods: &[],
    index_types: &[],
    operators: &[],
    has_schema: true,
    has_comments: false,
    formatter_dialect: "transactsql",
    api_endpoints: ApiEndpoints {
        schemas_url: Some("/get_schemas_mssql/"),
        types_url: Some("/get_types_mssql/"),
        indexes_url: "/get_indexes_mssql/",
        table_definition_url: "/get_table_definition_mssql/",
        foreign_keys_url: "/get_fks_mssql/",
    },
    disabled_features: DisabledFeatures {
        index_method: true,
        rename_index: true,
        ..DisabledFeatures::NONE
    },
};

impl Dialect {
    /// Every supported engine.
    pub const ALL: [Dialect; 4] = [Self::Postgresql, Self::Sqlite, Self::Mysql, Self::Mssql];

    /// Engine key, as used by the DDL builder.
    pub fn key(&self) -> &'static str {
        match self {
            Self::Postgresql => "postgres",
            Self::Sqlite => "sqlite3",
            Self::Mysql => "mysql",
            Self::Mssql => "mssql",
        }
    }

    /// Look up by engine key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key() == key)
    }

    /// Engine used for a connection technology, if it has one.
    pub fn from_technology(technology: Technology) -> Option<Self> {
        match technology {
            Technology::Postgresql => Some(Self::Postgresql),
            Technology::Mysql | Technology::Mariadb => Some(Self::Mysql),
            Technology::Sqlite => Some(Self::Sqlite),
            Technology::Mssql => Some(Self::Mssql),
            Technology::Oracle | Technology::Terminal => None,
        }
    }

    /// Suffix of the engine-specific REST endpoints.
    pub fn url_suffix(&self) -> &'static str {
        match self {
            Self::Postgresql => "postgresql",
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
            Self::Mssql => "mssql",
        }
    }

    /// Engine-specific endpoint path, e.g. `endpoint("get_tables")` →
    /// `/get_tables_postgresql/`.
    pub fn endpoint(&self, name: &str) -> String {
        format!("/{}_{}/", name, self.url_suffix())
    }

    /// Static descriptor.
    pub fn info(&self) -> &'static DialectInfo {
        match self {
            Self::Postgresql => &POSTGRES,
            Self::Sqlite => &SQLITE,
            Self::Mysql => &MYSQL,
            Self::Mssql => &MSSQL,
        }
    }

    /// Whether a column type is offered for this engine.
    pub fn is_valid_type(&self, data_type: &str) -> bool {
        let lower = data_type.trim().to_lowercase();
        // Strip a length/precision suffix: varchar(20) → varchar
        let base = lower.split('(').next().unwrap_or_default().trim();
        self.info().data_types.contains(&base)
    }

    /// Whether a type is formatted as a number.
    pub fn is_numeric_type(&self, data_type: &str) -> bool {
        self.info().numeric_types.contains(&data_type.trim().to_lowercase().as_str())
    }

    /// Whether the builder supports a feature on this engine.
    pub fn supports(&self, feature: Feature) -> bool {
        !self.info().disabled_features.contains(feature)
    }

    // ========== Identifier quoting ==========

    /// Quote an identifier.
    pub fn quote(&self, ident: &str) -> String {
        match self {
            Self::Postgresql | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
            Self::Mssql => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Quote a possibly schema-qualified table name.
    pub fn table_name(&self, schema: Option<&str>, table: &str) -> String {
        match schema {
            Some(schema) if self.info().has_schema && !schema.is_empty() => {
                format!("{}.{}", self.quote(schema), self.quote(table))
            }
            _ => self.quote(table),
        }
    }

    fn unsupported(&self, what: &str) -> ClientError {
        ClientError::validation(format!("{what} is not supported for {}", self.key()))
    }

    // ========== Builder overrides ==========

    /// Statement renaming an index.
    pub fn rename_index(&self, from: &str, to: &str) -> Result<String, ClientError> {
        if !self.supports(Feature::RenameIndex) {
            return Err(self.unsupported("Renaming an index"));
        }
        Ok(format!("ALTER INDEX {} RENAME TO {}", self.quote(from), self.quote(to)))
    }

    /// Statements dropping columns. SQLite needs one statement per column.
    pub fn drop_columns(&self, table: &str, columns: &[&str]) -> Vec<String> {
        if columns.is_empty() {
            return Vec::new();
        }
        match self {
            Self::Sqlite => columns
                .iter()
                .map(|c| format!("alter table {} drop column {}", self.quote(table), self.quote(c)))
                .collect(),
            Self::Mssql => {
                let cols: Vec<String> = columns.iter().map(|c| self.quote(c)).collect();
                vec![format!("ALTER TABLE {} DROP COLUMN {}", self.quote(table), cols.join(", "))]
            }
            Self::Postgresql | Self::Mysql => {
                let drops: Vec<String> =
                    columns.iter().map(|c| format!("drop column {}", self.quote(c))).collect();
                vec![format!("alter table {} {}", self.quote(table), drops.join(", "))]
            }
        }
    }

    /// Statement changing a column's nullability. MySQL restates the type.
    pub fn set_nullable(
        &self,
        table: &str,
        column: &str,
        data_type: &str,
        nullable: bool,
    ) -> Result<String, ClientError> {
        let nullability = if nullable { "NULL" } else { "NOT NULL" };
        match self {
            Self::Mysql => Ok(format!(
                "alter table {} modify {} {} {}",
                self.quote(table),
                self.quote(column),
                data_type,
                nullability
            )),
            Self::Postgresql => Ok(format!(
                "alter table {} alter column {} {}",
                self.quote(table),
                self.quote(column),
                if nullable { "drop not null" } else { "set not null" }
            )),
            Self::Mssql => Ok(format!(
                "ALTER TABLE {} ALTER COLUMN {} {} {}",
                self.quote(table),
                self.quote(column),
                data_type,
                nullability
            )),
            Self::Sqlite => Err(self.unsupported("Altering a column")),
        }
    }

    /// Statement renaming a column.
    pub fn rename_column(&self, table: &str, from: &str, to: &str) -> String {
        match self {
            Self::Mysql => format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                self.quote(table),
                self.quote(from),
                self.quote(to)
            ),
            Self::Mssql => format!(
                "exec sp_rename '{}.{}', '{}', 'COLUMN'",
                escape_literal(table),
                escape_literal(from),
                escape_literal(to)
            ),
            Self::Postgresql | Self::Sqlite => format!(
                "alter table {} rename {} to {}",
                self.quote(table),
                self.quote(from),
                self.quote(to)
            ),
        }
    }

    /// Statements removing the default of each column.
    ///
    /// SQL Server stores defaults as named constraints, so each column gets a
    /// lookup-and-drop script with its own variable (`@constraint0`, ...).
    pub fn drop_column_defaults(
        &self,
        schema: Option<&str>,
        table: &str,
        columns: &[&str],
    ) -> Result<Vec<String>, ClientError> {
        match self {
            Self::Mssql => {
                let schema = schema.filter(|s| !s.is_empty()).unwrap_or("dbo");
                Ok(columns
                    .iter()
                    .enumerate()
                    .map(|(i, column)| mssql_drop_default_script(i, schema, table, column))
                    .collect())
            }
            Self::Postgresql | Self::Mysql => Ok(columns
                .iter()
                .map(|c| {
                    format!(
                        "alter table {} alter column {} drop default",
                        self.table_name(schema, table),
                        self.quote(c)
                    )
                })
                .collect()),
            Self::Sqlite => Err(self.unsupported("Altering a column")),
        }
    }
}

/// Double single quotes so the text can sit inside a `'...'` literal.
fn escape_literal(text: &str) -> String {
    text.replace('\'', "''")
}

fn mssql_drop_default_script(index: usize, schema: &str, table: &str, column: &str) -> String {
    let (schema, table, column) = (escape_literal(schema), escape_literal(table), escape_literal(column));
    format!(
        "DECLARE @constraint{index} varchar(100) = (SELECT default_constraints.name \
         FROM sys.all_columns \
         INNER JOIN sys.tables ON all_columns.object_id = tables.object_id \
         INNER JOIN sys.schemas ON tables.schema_id = schemas.schema_id \
         INNER JOIN sys.default_constraints ON all_columns.default_object_id = default_constraints.object_id \
         WHERE schemas.name = '{schema}' AND tables.name = '{table}' AND all_columns.name = '{column}')\n\
         IF @constraint{index} IS NOT NULL EXEC('ALTER TABLE {schema}.{table} DROP CONSTRAINT ' + @constraint{index})"
    )
}
