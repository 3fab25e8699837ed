//! Category command handlers.

use crate::args::{AddCategoryArgs, ListCategoriesArgs};
use crate::commands::Out;
use crate::model::Category;
use crate::{utils, Config, Result};

/// Creates a category with a generated id.
///
/// # Errors
/// - Returns an error if a database operation fails.
pub async fn add_category(config: Config, args: AddCategoryArgs) -> Result<Out<Category>> {
    let category = Category::new(
        utils::generate_id(),
        args.name,
        args.icon,
        args.kind,
        args.color,
    );
    config.db().create_category(&category).await?;
    Ok(Out::new(
        format!(
            "Created {} category '{}' with ID: {}",
            category.kind, category.name, category.id
        ),
        category,
    ))
}

/// Sets or clears the hidden flag. Hiding is undone by calling this again with `hidden = false`.
pub async fn hide_category(config: Config, id: &str, hidden: bool) -> Result<Out<Category>> {
    let category = config.db().hide_category(id, hidden).await?;
    let verb = if hidden { "Hid" } else { "Restored" };
    Ok(Out::new(
        format!("{verb} category '{}'", category.name),
        category,
    ))
}

pub async fn list_categories(
    config: Config,
    args: ListCategoriesArgs,
) -> Result<Out<Vec<Category>>> {
    let categories = config.db().categories(args.all).await?;
    let mut message = format!("{} categories", categories.len());
    for c in &categories {
        let hidden = if c.hidden { " (hidden)" } else { "" };
        message.push_str(&format!("\n  {} {:<8} {}{hidden}", c.id, c.kind, c.name));
    }
    Ok(Out::new(message, categories))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Kind;
    use crate::test::TestEnv;

    #[tokio::test]
    async fn test_add_hide_list() {
        let env = TestEnv::new().await;
        let args = AddCategoryArgs {
            name: "Rent".to_string(),
            kind: Kind::Expense,
            icon: "home".to_string(),
            color: "#0000ff".to_string(),
        };
        let created = add_category(env.config(), args).await.unwrap();
        let id = created.structure().unwrap().id.clone();

        hide_category(env.config(), &id, true).await.unwrap();
        let visible = list_categories(env.config(), ListCategoriesArgs { all: false })
            .await
            .unwrap();
        assert!(visible.structure().unwrap().is_empty());

        hide_category(env.config(), &id, false).await.unwrap();
        let all = list_categories(env.config(), ListCategoriesArgs { all: true })
            .await
            .unwrap();
        assert_eq!(all.structure().unwrap(), &vec![created.structure().unwrap().clone()]);
    }
}
