use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;

use super::RecordStore;
use crate::error::Result;
use crate::listing::{Predicate, Term};
use crate::models::{Collection, CounterKind, ListingRecord, Sort, SortDirection, SortValue};

const COLUMNS: &str = "id, kind, category, role, city, title, description, content, tags, \
    author_id, lat, lng, view_count, like_count, collect_count, rating, created_at, updated_at";

/// Postgres-backed store for one collection table
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    collection: Collection,
}

impl PgRecordStore {
    pub fn new(pool: PgPool, collection: Collection) -> Self {
        Self { pool, collection }
    }

    fn select_builder(&self, predicate: &Predicate) -> QueryBuilder<'static, Postgres> {
        let mut builder = QueryBuilder::new(format!(
            "SELECT {} FROM {} WHERE deleted_at IS NULL",
            COLUMNS,
            self.collection.table()
        ));
        push_predicate(&mut builder, predicate);
        builder
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn find(
        &self,
        predicate: &Predicate,
        sort: &Sort,
        skip: u64,
        take: u64,
    ) -> Result<Vec<ListingRecord>> {
        let mut builder = self.select_builder(predicate);
        let direction = sort.direction.as_sql();
        builder.push(format!(
            " ORDER BY {} {}, id COLLATE \"C\" {}",
            sort.key.column(),
            direction,
            direction
        ));
        builder.push(" LIMIT ");
        builder.push_bind(to_i64(take));
        builder.push(" OFFSET ");
        builder.push_bind(to_i64(skip));

        let rows = builder
            .build_query_as::<ListingRecord>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let mut builder: QueryBuilder<'static, Postgres> = QueryBuilder::new(format!(
            "SELECT COUNT(*) FROM {} WHERE deleted_at IS NULL",
            self.collection.table()
        ));
        push_predicate(&mut builder, predicate);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<ListingRecord>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1 AND deleted_at IS NULL",
            COLUMNS,
            self.collection.table()
        );
        let record = sqlx::query_as::<_, ListingRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn increment(&self, id: &str, counter: CounterKind, delta: i64) -> Result<()> {
        let column = counter.column();
        let sql = format!(
            "UPDATE {} SET {col} = GREATEST({col} + $1, 0) WHERE id = $2",
            self.collection.table(),
            col = column
        );
        let result = sqlx::query(&sql)
            .bind(delta)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            debug!(
                collection = self.collection.as_str(),
                id,
                counter = counter.as_str(),
                "increment skipped, row no longer exists"
            );
        }
        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_predicate(builder: &mut QueryBuilder<'static, Postgres>, predicate: &Predicate) {
    for term in &predicate.terms {
        builder.push(" AND ");
        push_term(builder, term);
    }
}

fn push_term(builder: &mut QueryBuilder<'static, Postgres>, term: &Term) {
    match term {
        Term::Equals { field, value } => {
            builder.push(format!("{} = ", field.column()));
            builder.push_bind(value.clone());
        }
        Term::Contains { field, needle } => {
            builder.push(format!("{} ILIKE ", field.column()));
            builder.push_bind(format!("%{}%", escape_like(needle)));
            builder.push(" ESCAPE '\\'");
        }
        Term::TagsOverlap(tags) => {
            builder.push("tags && ");
            builder.push_bind(tags.clone());
        }
        Term::HasTag(tag) => {
            builder.push_bind(tag.clone());
            builder.push(" = ANY(tags)");
        }
        Term::Any(terms) => {
            if terms.is_empty() {
                builder.push("FALSE");
                return;
            }
            builder.push("(");
            for (i, inner) in terms.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                push_term(builder, inner);
            }
            builder.push(")");
        }
        Term::After {
            key,
            direction,
            value,
            id,
        } => {
            let op = match direction {
                SortDirection::Asc => ">",
                SortDirection::Desc => "<",
            };
            builder.push(format!("({}, id COLLATE \"C\") {} (", key.column(), op));
            push_sort_value(builder, value);
            builder.push(", ");
            builder.push_bind(id.clone());
            builder.push("::text COLLATE \"C\")");
        }
    }
}

fn push_sort_value(builder: &mut QueryBuilder<'static, Postgres>, value: &SortValue) {
    match value {
        SortValue::Text(v) => builder.push_bind(v.clone()),
        SortValue::Int(v) => builder.push_bind(*v),
        SortValue::Float(v) => builder.push_bind(*v),
        SortValue::Timestamp(v) => builder.push_bind(*v),
    };
}

/// Escape LIKE wildcards so user input is matched literally.
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
