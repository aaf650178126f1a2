use super::{backtick, non_empty, on_cluster, owned, quote, QueryBuildError};

#[derive(Debug, Clone, Default)]
pub struct CreateDatabaseQuery {
    name: String,
    cluster: Option<String>,
    comment: Option<String>,
}

impl CreateDatabaseQuery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.cluster = owned(cluster);
        self
    }

    pub fn with_comment(mut self, comment: Option<&str>) -> Self {
        self.comment = owned(comment);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        non_empty(&self.name, "CREATE DATABASE", "name")?;

        let mut tokens = vec!["CREATE DATABASE".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));
        if let Some(comment) = &self.comment {
            tokens.push(format!("COMMENT {}", quote(comment)));
        }

        Ok(format!("{};", tokens.join(" ")))
    }
}

#[derive(Debug, Clone, Default)]
pub struct DropDatabaseQuery {
    name: String,
    cluster: Option<String>,
}

impl DropDatabaseQuery {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            cluster: None,
        }
    }

    pub fn with_cluster(mut self, cluster: Option<&str>) -> Self {
        self.cluster = owned(cluster);
        self
    }

    pub fn build(&self) -> Result<String, QueryBuildError> {
        non_empty(&self.name, "DROP DATABASE", "name")?;

        let mut tokens = vec!["DROP DATABASE".to_string(), backtick(&self.name)];
        tokens.extend(on_cluster(&self.cluster));

        Ok(format!("{};", tokens.join(" ")))
    }
}
