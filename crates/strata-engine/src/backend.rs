//! Backend trait and the BigQuery text backend.

use strata_types::{DataType, Scalar};
use tracing::trace;

use crate::error::EngineError;
use crate::table::Table;
use crate::value::{AggFunc, AnalyticFunc, Frame, Func, ValueExpr, Window};

/// A SQL generation backend.
pub trait Backend {
    /// Render a table as a complete query.
    fn compile(&self, table: &Table) -> Result<String, EngineError>;
}

/// GoogleSQL (BigQuery) backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigQueryBackend;

impl Backend for BigQueryBackend {
    fn compile(&self, table: &Table) -> Result<String, EngineError> {
        let mut renderer = Renderer::default();
        let sql = renderer.table(table)?;
        trace!(sql = %sql, "compiled table");
        Ok(sql)
    }
}

#[derive(Default)]
struct Renderer {
    next_alias: usize,
}

impl Renderer {
    fn fresh_alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    /// A `FROM` item for `table` and the alias its columns are qualified with.
    fn from_item(&mut self, table: &Table) -> Result<(String, String), EngineError> {
        let alias = self.fresh_alias();
        let item = match table {
            Table::Source { name, .. } => format!("{} AS {}", quote_ident(name), alias),
            _ => format!("({}) AS {}", self.table(table)?, alias),
        };
        Ok((item, alias))
    }

    fn table(&mut self, table: &Table) -> Result<String, EngineError> {
        match table {
            Table::Source { name, .. } => Ok(format!("SELECT * FROM {}", quote_ident(name))),

            Table::Memtable { schema, rows } => {
                if schema.is_empty() {
                    return Ok("SELECT * FROM UNNEST(ARRAY<INT64>[])".to_string());
                }
                let fields = schema
                    .iter()
                    .map(|(name, dtype)| format!("{} {}", quote_ident(name), dtype.sql_name()))
                    .collect::<Vec<_>>()
                    .join(", ");
                let values = rows
                    .iter()
                    .map(|row| {
                        let items = row
                            .iter()
                            .zip(schema.iter())
                            .map(|(value, (_, dtype))| literal(value, dtype))
                            .collect::<Vec<_>>()
                            .join(", ");
                        format!("STRUCT({})", items)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                Ok(format!(
                    "SELECT * FROM UNNEST(ARRAY<STRUCT<{}>>[{}])",
                    fields, values
                ))
            }

            Table::Select { input, columns } => {
                let (from, alias) = self.from_item(input)?;
                if columns.is_empty() {
                    return Err(EngineError::Unsupported(
                        "projection with no columns".to_string(),
                    ));
                }
                let items = columns
                    .iter()
                    .map(|(name, value)| {
                        let sql = self.value(value, &alias)?;
                        Ok(match value.as_column() {
                            Some(source) if source == name.as_str() => sql,
                            _ => format!("{} AS {}", sql, quote_ident(name)),
                        })
                    })
                    .collect::<Result<Vec<_>, EngineError>>()?;
                Ok(format!("SELECT {} FROM {}", items.join(", "), from))
            }

            Table::Filter { input, predicate } => {
                let (from, alias) = self.from_item(input)?;
                let pred = self.value(predicate, &alias)?;
                Ok(format!("SELECT {}.* FROM {} WHERE {}", alias, from, pred))
            }

            Table::Aggregate { input, by, metrics } => {
                if by.is_empty() && metrics.is_empty() {
                    return Err(EngineError::Unsupported(
                        "aggregation with no output columns".to_string(),
                    ));
                }
                let (from, alias) = self.from_item(input)?;
                let keys: Vec<String> = by
                    .iter()
                    .map(|key| format!("{}.{}", alias, quote_ident(key)))
                    .collect();
                let mut items = keys.clone();
                for (name, value) in metrics {
                    items.push(format!(
                        "{} AS {}",
                        self.value(value, &alias)?,
                        quote_ident(name)
                    ));
                }
                let group_clause = if keys.is_empty() {
                    String::new()
                } else {
                    format!(" GROUP BY {}", keys.join(", "))
                };
                Ok(format!(
                    "SELECT {} FROM {}{}",
                    items.join(", "),
                    from,
                    group_clause
                ))
            }

            Table::Unnest { input, column } => {
                let (from, alias) = self.from_item(input)?;
                let element = self.fresh_alias();
                let col = quote_ident(column);
                Ok(format!(
                    "SELECT {alias}.* REPLACE ({element} AS {col}) FROM {from} CROSS JOIN UNNEST({alias}.{col}) AS {element}"
                ))
            }

            Table::Limit { input, count } => {
                let (from, alias) = self.from_item(input)?;
                Ok(format!("SELECT {}.* FROM {} LIMIT {}", alias, from, count))
            }
        }
    }

    fn value(&self, value: &ValueExpr, alias: &str) -> Result<String, EngineError> {
        match value {
            ValueExpr::Column { name, .. } => Ok(format!("{}.{}", alias, quote_ident(name))),
            ValueExpr::Literal { value, dtype } => Ok(literal(value, dtype)),
            ValueExpr::Random => Ok("RAND()".to_string()),
            ValueExpr::Cast { expr, to } => Ok(format!(
                "CAST({} AS {})",
                self.value(expr, alias)?,
                to.sql_name()
            )),
            ValueExpr::Case {
                branches,
                otherwise,
            } => {
                let mut sql = "CASE".to_string();
                for (cond, result) in branches {
                    sql.push_str(&format!(
                        " WHEN {} THEN {}",
                        self.value(cond, alias)?,
                        self.value(result, alias)?
                    ));
                }
                sql.push_str(&format!(" ELSE {} END", self.value(otherwise, alias)?));
                Ok(sql)
            }
            ValueExpr::Call { func, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.value(arg, alias))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(call(*func, &args))
            }
            ValueExpr::Aggregate { func, arg } => {
                let arg = arg
                    .as_ref()
                    .map(|arg| self.value(arg, alias))
                    .transpose()?;
                aggregate(*func, arg.as_deref())
            }
            ValueExpr::Analytic { func, window } => self.analytic(func, window, alias),
        }
    }

    fn analytic(
        &self,
        func: &AnalyticFunc,
        window: &Window,
        alias: &str,
    ) -> Result<String, EngineError> {
        let over = self.window(window, func.accepts_frame(), alias)?;
        let sql = match func {
            AnalyticFunc::Aggregate(agg, arg) => {
                let arg = arg
                    .as_ref()
                    .map(|arg| self.value(arg, alias))
                    .transpose()?;
                format!("{} OVER ({})", aggregate(*agg, arg.as_deref())?, over)
            }
            AnalyticFunc::RowNumber => format!("(ROW_NUMBER() OVER ({}) - 1)", over),
            AnalyticFunc::Rank | AnalyticFunc::DenseRank => {
                format!("{}() OVER ({})", func.name(), over)
            }
            AnalyticFunc::FirstValue(arg) | AnalyticFunc::LastValue(arg) => {
                format!("{}({}) OVER ({})", func.name(), self.value(arg, alias)?, over)
            }
            AnalyticFunc::Lag(arg, offset) | AnalyticFunc::Lead(arg, offset) => format!(
                "{}({}, {}) OVER ({})",
                func.name(),
                self.value(arg, alias)?,
                offset,
                over
            ),
        };
        Ok(sql)
    }

    fn window(
        &self,
        window: &Window,
        with_frame: bool,
        alias: &str,
    ) -> Result<String, EngineError> {
        let mut parts = Vec::new();
        if !window.partition_by.is_empty() {
            let keys = window
                .partition_by
                .iter()
                .map(|key| self.value(key, alias))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push(format!("PARTITION BY {}", keys.join(", ")));
        }
        if window.is_ordered() {
            let keys = window
                .order_by
                .iter()
                .map(|key| {
                    let dir = if key.ascending { "ASC" } else { "DESC" };
                    Ok(format!("{} {}", self.value(&key.expr, alias)?, dir))
                })
                .collect::<Result<Vec<_>, EngineError>>()?;
            parts.push(format!("ORDER BY {}", keys.join(", ")));
            if let (true, Some(frame)) = (with_frame, window.frame) {
                parts.push(frame_clause(frame));
            }
        }
        Ok(parts.join(" "))
    }
}

fn frame_clause(frame: Frame) -> String {
    let start = match frame.preceding {
        None => "UNBOUNDED PRECEDING".to_string(),
        Some(0) => "CURRENT ROW".to_string(),
        Some(n) => format!("{} PRECEDING", n),
    };
    let end = match frame.following {
        None => "UNBOUNDED FOLLOWING".to_string(),
        Some(0) => "CURRENT ROW".to_string(),
        Some(n) => format!("{} FOLLOWING", n),
    };
    format!("ROWS BETWEEN {} AND {}", start, end)
}

fn call(func: Func, args: &[String]) -> String {
    match func {
        Func::Add
        | Func::Sub
        | Func::Mul
        | Func::Eq
        | Func::Ne
        | Func::Lt
        | Func::Le
        | Func::Gt
        | Func::Ge
        | Func::And
        | Func::Or => format!("({} {} {})", args[0], func.sql_name(), args[1]),
        Func::Neg => format!("(-{})", args[0]),
        Func::Not => format!("(NOT {})", args[0]),
        Func::IsNull | Func::IsNotNull => format!("({} {})", args[0], func.sql_name()),
        Func::SafeOffset => format!("{}[SAFE_OFFSET({})]", args[0], args[1]),
        _ => format!("{}({})", func.sql_name(), args.join(", ")),
    }
}

fn aggregate(func: AggFunc, arg: Option<&str>) -> Result<String, EngineError> {
    match (func, arg) {
        (AggFunc::CountStar, _) => Ok("COUNT(*)".to_string()),
        (AggFunc::CountDistinct, Some(arg)) => Ok(format!("COUNT(DISTINCT {})", arg)),
        (_, Some(arg)) => Ok(format!("{}({})", func.sql_name(), arg)),
        (_, None) => Err(EngineError::Unsupported(format!(
            "{} without an argument",
            func.sql_name()
        ))),
    }
}

/// Render a literal of the given type.
fn literal(value: &Scalar, dtype: &DataType) -> String {
    let natural = value.data_type();
    let sql = match value {
        Scalar::Null => {
            return if dtype.is_null() {
                "NULL".to_string()
            } else {
                format!("CAST(NULL AS {})", dtype.sql_name())
            };
        }
        Scalar::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        Scalar::Int64(n) => n.to_string(),
        Scalar::Float64(f) => {
            if f.is_nan() {
                "CAST('NaN' AS FLOAT64)".to_string()
            } else if f.is_infinite() {
                let sign = if *f > 0.0 { "" } else { "-" };
                format!("CAST('{}inf' AS FLOAT64)", sign)
            } else {
                format!("{:?}", f)
            }
        }
        Scalar::String(s) => quote_string(s),
        Scalar::Timestamp(micros) => format!("TIMESTAMP_MICROS({})", micros),
        Scalar::Geography(wkt) => format!("ST_GEOGFROMTEXT({})", quote_string(wkt)),
        Scalar::Array(items) => {
            let elem = match dtype.element_type() {
                Some(elem) if !elem.is_null() => elem.clone(),
                _ => natural.element_type().cloned().unwrap_or(DataType::Null),
            };
            let items = items
                .iter()
                .map(|item| literal(item, &elem))
                .collect::<Vec<_>>()
                .join(", ");
            return format!("{}[{}]", DataType::Array(Box::new(elem)).sql_name(), items);
        }
    };
    if &natural == dtype || dtype.is_null() {
        sql
    } else {
        format!("CAST({} AS {})", sql, dtype.sql_name())
    }
}

/// Quote an identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// Quote a string literal.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::table::Schema;
    use crate::value::SortKey;

    fn orders() -> Arc<Table> {
        let schema = Schema::from_fields([
            ("id", DataType::Int64),
            ("amount", DataType::Float64),
            ("items", DataType::Array(Box::new(DataType::String))),
        ])
        .unwrap();
        Arc::new(Table::source("orders", schema))
    }

    fn col(name: &str, dtype: DataType) -> ValueExpr {
        ValueExpr::column(name, dtype)
    }

    #[test]
    fn test_source() {
        let sql = BigQueryBackend.compile(&orders()).unwrap();
        assert_eq!(sql, "SELECT * FROM `orders`");
    }

    #[test]
    fn test_select_with_rename() {
        let table = Table::select(
            orders(),
            vec![
                ("id".to_string(), col("id", DataType::Int64)),
                ("total".to_string(), col("amount", DataType::Float64)),
            ],
        )
        .unwrap();
        let sql = BigQueryBackend.compile(&table).unwrap();
        assert_eq!(
            sql,
            "SELECT t0.`id`, t0.`amount` AS `total` FROM `orders` AS t0"
        );
    }

    #[test]
    fn test_filter_nested() {
        let filtered = Table::filter(
            orders(),
            ValueExpr::call(
                Func::Gt,
                vec![col("amount", DataType::Float64), ValueExpr::literal(10.0)],
            ),
        )
        .unwrap();
        let limited = Table::limit(Arc::new(filtered), 5);
        let sql = BigQueryBackend.compile(&limited).unwrap();
        assert_eq!(
            sql,
            "SELECT t0.* FROM (SELECT t1.* FROM `orders` AS t1 WHERE (t1.`amount` > 10.0)) AS t0 LIMIT 5"
        );
    }

    #[test]
    fn test_division_is_ieee() {
        let div = ValueExpr::call(
            Func::Div,
            vec![col("amount", DataType::Float64), ValueExpr::literal(0i64)],
        );
        let table = Table::select(orders(), vec![("r".to_string(), div)]).unwrap();
        let sql = BigQueryBackend.compile(&table).unwrap();
        assert!(sql.contains("IEEE_DIVIDE(t0.`amount`, 0)"));
    }

    #[test]
    fn test_unnest() {
        let table = Table::unnest(orders(), "items").unwrap();
        let sql = BigQueryBackend.compile(&table).unwrap();
        assert_eq!(
            sql,
            "SELECT t0.* REPLACE (t1 AS `items`) FROM `orders` AS t0 CROSS JOIN UNNEST(t0.`items`) AS t1"
        );
    }

    #[test]
    fn test_memtable() {
        let schema =
            Schema::from_fields([("a", DataType::Int64), ("b", DataType::String)]).unwrap();
        let table = Table::memtable(
            schema,
            vec![
                vec![Scalar::Int64(1), Scalar::String("x".to_string())],
                vec![Scalar::Null, Scalar::String("it's".to_string())],
            ],
        )
        .unwrap();
        let sql = BigQueryBackend.compile(&table).unwrap();
        assert_eq!(
            sql,
            "SELECT * FROM UNNEST(ARRAY<STRUCT<`a` INT64, `b` STRING>>[STRUCT(1, 'x'), STRUCT(CAST(NULL AS INT64), 'it\\'s')])"
        );
    }

    #[test]
    fn test_row_number_is_zero_based() {
        let window = Window {
            partition_by: vec![],
            order_by: vec![SortKey {
                expr: col("id", DataType::Int64),
                ascending: true,
            }],
            frame: Some(Frame::default()),
        };
        let rn = ValueExpr::over(AnalyticFunc::RowNumber, window);
        let table = Table::select(orders(), vec![("rn".to_string(), rn)]).unwrap();
        let sql = BigQueryBackend.compile(&table).unwrap();
        // Ranking functions never carry a frame.
        assert!(sql.contains("(ROW_NUMBER() OVER (ORDER BY t0.`id` ASC) - 1)"));
    }

    #[test]
    fn test_aggregate_frame_requires_order() {
        let sum = |window: Window| {
            ValueExpr::over(
                AnalyticFunc::Aggregate(
                    AggFunc::Sum,
                    Some(Box::new(col("amount", DataType::Float64))),
                ),
                window,
            )
        };
        let ordered = sum(Window {
            partition_by: vec![],
            order_by: vec![SortKey {
                expr: col("id", DataType::Int64),
                ascending: true,
            }],
            frame: Some(Frame {
                preceding: Some(2),
                following: Some(0),
            }),
        });
        let r = Renderer::default();
        assert_eq!(
            r.value(&ordered, "t0").unwrap(),
            "SUM(t0.`amount`) OVER (ORDER BY t0.`id` ASC ROWS BETWEEN 2 PRECEDING AND CURRENT ROW)"
        );

        let unordered = sum(Window {
            partition_by: vec![col("id", DataType::Int64)],
            order_by: vec![],
            frame: Some(Frame::default()),
        });
        assert_eq!(
            r.value(&unordered, "t0").unwrap(),
            "SUM(t0.`amount`) OVER (PARTITION BY t0.`id`)"
        );
    }

    #[test]
    fn test_grouped_aggregate() {
        let table = Table::aggregate(
            orders(),
            vec!["id".to_string()],
            vec![(
                "n".to_string(),
                ValueExpr::Aggregate {
                    func: AggFunc::CountStar,
                    arg: None,
                },
            )],
        )
        .unwrap();
        let sql = BigQueryBackend.compile(&table).unwrap();
        assert_eq!(
            sql,
            "SELECT t0.`id`, COUNT(*) AS `n` FROM `orders` AS t0 GROUP BY t0.`id`"
        );
    }

    #[test]
    fn test_literals() {
        assert_eq!(literal(&Scalar::Float64(1.0), &DataType::Float64), "1.0");
        assert_eq!(
            literal(&Scalar::Float64(f64::NAN), &DataType::Float64),
            "CAST('NaN' AS FLOAT64)"
        );
        assert_eq!(literal(&Scalar::Int64(0), &DataType::Float64), "CAST(0 AS FLOAT64)");
        assert_eq!(
            literal(&Scalar::Array(vec![]), &DataType::Array(Box::new(DataType::Int64))),
            "ARRAY<INT64>[]"
        );
    }

    #[test]
    fn test_quote_injection() {
        assert_eq!(quote_ident("a`b"), "`a\\`b`");
        assert_eq!(quote_string("'; DROP TABLE x;--"), "'\\'; DROP TABLE x;--'");
    }
}
