//! Templates and lookup option lists.

use serde::{Deserialize, Serialize};

use super::required;
use crate::db::Database;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{LookupKind, LookupOption, Template};

/// Template fields; `None` keeps the current value on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

/// Lookup option fields; `None` keeps the current value on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub sort_order: Option<i64>,
    pub is_active: Option<bool>,
}

pub struct CatalogService<'a> {
    db: &'a Database,
}

impl<'a> CatalogService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn list_templates(&self, is_active: Option<bool>) -> ServiceResult<Vec<Template>> {
        Ok(self.db.list_templates(is_active)?)
    }

    pub fn get_template(&self, id: &str) -> ServiceResult<Template> {
        self.db
            .get_template(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Template {}", id)))
    }

    pub fn create_template(&self, input: TemplateInput) -> ServiceResult<Template> {
        let name = required("name", input.name.as_deref().unwrap_or_default())?;
        let mut template = Template::new(name, input.description.unwrap_or_default());
        if let Some(is_active) = input.is_active {
            template.is_active = is_active;
        }

        self.db.insert_template(&template)?;
        log::info!("Created template {} ({})", template.name, template.id);
        Ok(template)
    }

    pub fn update_template(&self, id: &str, input: TemplateInput) -> ServiceResult<Template> {
        let mut template = self.get_template(id)?;
        if let Some(name) = input.name {
            template.name = required("name", &name)?;
        }
        if let Some(description) = input.description {
            template.description = description;
        }
        if let Some(is_active) = input.is_active {
            template.is_active = is_active;
        }

        self.db.update_template(&template)?;
        self.get_template(id)
    }

    /// Delete a template along with every prescription built on it.
    pub fn delete_template(&self, id: &str) -> ServiceResult<()> {
        if !self.db.delete_template(id)? {
            return Err(ServiceError::not_found(format!("Template {}", id)));
        }
        log::info!("Deleted template {}", id);
        Ok(())
    }

    pub fn list_lookups(&self, kind: LookupKind, active_only: bool) -> ServiceResult<Vec<LookupOption>> {
        Ok(self.db.list_lookup_options(kind, active_only)?)
    }

    pub fn get_lookup(&self, id: &str) -> ServiceResult<LookupOption> {
        self.db
            .get_lookup_option(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Lookup option {}", id)))
    }

    pub fn create_lookup(&self, kind: LookupKind, input: LookupInput) -> ServiceResult<LookupOption> {
        let name = required("name", input.name.as_deref().unwrap_or_default())?;
        self.ensure_unique_name(kind, &name, None)?;

        let mut option = LookupOption::new(kind, name);
        if let Some(description) = input.description {
            option.description = description;
        }
        if input.color.is_some() {
            option.color = input.color;
        }
        if let Some(sort_order) = input.sort_order {
            option.sort_order = sort_order;
        }
        if let Some(is_active) = input.is_active {
            option.is_active = is_active;
        }

        self.db.insert_lookup_option(&option)?;
        log::info!("Created {} option {}", kind, option.name);
        Ok(option)
    }

    pub fn update_lookup(&self, id: &str, input: LookupInput) -> ServiceResult<LookupOption> {
        let mut option = self.get_lookup(id)?;
        if let Some(name) = input.name {
            let name = required("name", &name)?;
            self.ensure_unique_name(option.kind, &name, Some(id))?;
            option.name = name;
        }
        if let Some(description) = input.description {
            option.description = description;
        }
        if input.color.is_some() {
            option.color = input.color;
        }
        if let Some(sort_order) = input.sort_order {
            option.sort_order = sort_order;
        }
        if let Some(is_active) = input.is_active {
            option.is_active = is_active;
        }

        self.db.update_lookup_option(&option)?;
        self.get_lookup(id)
    }

    /// Delete a lookup option; prescriptions using it keep an empty reference.
    pub fn delete_lookup(&self, id: &str) -> ServiceResult<()> {
        if !self.db.delete_lookup_option(id)? {
            return Err(ServiceError::not_found(format!("Lookup option {}", id)));
        }
        Ok(())
    }

    fn ensure_unique_name(&self, kind: LookupKind, name: &str, except: Option<&str>) -> ServiceResult<()> {
        match self.db.find_lookup_option(kind, name)? {
            Some(existing) if Some(existing.id.as_str()) != except => Err(ServiceError::validation(
                "name",
                format!("{} with this name already exists.", kind),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_template_crud() {
        let db = setup_db();
        let catalog = CatalogService::new(&db);

        let template = catalog
            .create_template(TemplateInput {
                name: Some("Sports".into()),
                ..Default::default()
            })
            .unwrap();
        assert!(template.is_active);

        let updated = catalog
            .update_template(
                &template.id,
                TemplateInput {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.name, "Sports");
        assert_eq!(catalog.list_templates(Some(false)).unwrap().len(), 1);

        catalog.delete_template(&template.id).unwrap();
        assert!(matches!(
            catalog.get_template(&template.id),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_template_name_required() {
        let db = setup_db();
        let err = CatalogService::new(&db)
            .create_template(TemplateInput::default())
            .unwrap_err();
        match err {
            ServiceError::Validation(errors) => assert!(errors.get("name").is_some()),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_lookup_names_unique_per_kind() {
        let db = setup_db();
        let catalog = CatalogService::new(&db);
        let input = LookupInput {
            name: Some("Draft".into()),
            ..Default::default()
        };

        let draft = catalog.create_lookup(LookupKind::Status, input.clone()).unwrap();
        assert_eq!(draft.color.as_deref(), Some("primary"));
        assert!(matches!(
            catalog.create_lookup(LookupKind::Status, input.clone()),
            Err(ServiceError::Validation(_))
        ));
        catalog.create_lookup(LookupKind::FootType, input.clone()).unwrap();

        // Renaming to its own name is fine
        catalog.update_lookup(&draft.id, input).unwrap();
    }
}
