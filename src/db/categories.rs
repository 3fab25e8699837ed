use crate::db::changes::{fetch_record, write_record, CategoryRecord, Record, RowStatus, WriteMode};
use crate::db::{Db, Table};
use crate::model::Category;
use crate::{Error, Result};
use tracing::debug;

impl Db {
    /// Stores a new category. The id is supplied by the caller and must not exist yet.
    pub async fn create_category(&self, category: &Category) -> Result<()> {
        category.validate()?;
        let mut tx = self.begin_write().await?;
        let revision = tx.revision();
        write_record(
            tx.conn(),
            &CategoryRecord::from(category),
            WriteMode::Insert,
            RowStatus::Created,
            revision,
        )
        .await?;
        tx.touch(Table::Categories);
        tx.commit().await?;
        debug!("Created category {} '{}'", category.id, category.name);
        Ok(())
    }

    pub async fn find_category(&self, id: &str) -> Result<Category> {
        let mut conn = self.pool().acquire().await?;
        fetch_record::<CategoryRecord>(&mut conn, id)
            .await?
            .map(Category::from)
            .ok_or_else(|| Error::not_found("category", id))
    }

    /// Finds a category by name, ignoring case. Hidden categories are included.
    pub async fn find_category_by_name(&self, name: &str) -> Result<Category> {
        let sql = format!(
            "SELECT {} FROM categories WHERE name = ? COLLATE NOCASE ORDER BY hidden, id LIMIT 1",
            CategoryRecord::COLUMNS.join(", ")
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(self.pool())
            .await?;
        match row {
            Some(row) => Ok(CategoryRecord::from_row(&row)?.into()),
            None => Err(Error::not_found("category", name)),
        }
    }

    /// All categories ordered by name.
    pub async fn categories(&self, include_hidden: bool) -> Result<Vec<Category>> {
        let sql = format!(
            "SELECT {} FROM categories WHERE ? OR hidden = 0 ORDER BY name COLLATE NOCASE, id",
            CategoryRecord::COLUMNS.join(", ")
        );
        let rows = sqlx::query(&sql)
            .bind(include_hidden)
            .fetch_all(self.pool())
            .await?;
        rows.iter()
            .map(|row| CategoryRecord::from_row(row).map(Category::from))
            .collect()
    }

    /// Loads the category, applies `mutator` and stores the result, all inside one write
    /// transaction. Changing the id or the kind is refused.
    pub async fn update_category<F>(&self, id: &str, mutator: F) -> Result<Category>
    where
        F: FnOnce(&mut Category) + Send,
    {
        let mut tx = self.begin_write().await?;
        let revision = tx.revision();
        let current: Category = fetch_record::<CategoryRecord>(tx.conn(), id)
            .await?
            .ok_or_else(|| Error::not_found("category", id))?
            .into();

        let mut next = current.clone();
        mutator(&mut next);
        if next.id != current.id {
            return Err(Error::invalid("id", "the id of a category cannot be changed"));
        }
        if next.kind != current.kind {
            return Err(Error::ImmutableCategoryKind {
                id: current.id,
                from: current.kind.to_string(),
                to: next.kind.to_string(),
            });
        }
        next.validate()?;

        write_record(
            tx.conn(),
            &CategoryRecord::from(&next),
            WriteMode::Upsert,
            RowStatus::Updated,
            revision,
        )
        .await?;
        tx.touch(Table::Categories);
        tx.commit().await?;
        Ok(next)
    }

    /// Sets or clears the soft-delete flag.
    pub async fn hide_category(&self, id: &str, hidden: bool) -> Result<Category> {
        self.update_category(id, |c| c.hidden = hidden).await
    }
}
