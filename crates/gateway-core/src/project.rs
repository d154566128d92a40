//! A static, startup-built table binding project name to its immutable
//! configuration.

use crate::domain::Project;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct ProjectRegistry {
    projects: HashMap<String, Project>,
}

impl ProjectRegistry {
    pub fn new(projects: Vec<Project>) -> Self {
        let projects = projects.into_iter().map(|p| (p.name.clone(), p)).collect();
        Self { projects }
    }

    /// Looks up a project by name. Lookup should never fail for a project
    /// the gateway has actually subscribed to; callers on the MQTT ingress
    /// path are expected to hold the project name that produced the
    /// subscription in the first place.
    pub fn lookup(&self, name: &str) -> Option<&Project> {
        self.projects.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GenParams;

    fn project(name: &str) -> Project {
        Project {
            name: name.to_string(),
            system_prompt: "SYS".to_string(),
            input_topic: format!("{name}/user_input"),
            reply_topic_template: format!("{name}/assistant_response/{{sessionId}}"),
            default_gen_params: GenParams::default(),
        }
    }

    #[test]
    fn lookup_finds_registered_project() {
        let registry = ProjectRegistry::new(vec![project("general"), project("maze")]);
        assert!(registry.lookup("general").is_some());
        assert!(registry.lookup("driving").is_none());
    }
}
