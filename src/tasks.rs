use rand::Rng;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Range generated task ids are drawn from.
pub const GENERATED_ID_RANGE: RangeInclusive<u32> = 200..=1099;

const MAX_ID_DRAWS: usize = 32;

/// One adversarial prompt to send to a target model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub language: String,
    pub prompt: String,
}

/// A task as returned by the generation endpoint, before it has an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub difficulty: String,
    pub language: String,
    pub prompt: String,
}

impl Task {
    pub fn from_draft(id: String, draft: TaskDraft) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            difficulty: draft.difficulty,
            language: draft.language,
            prompt: draft.prompt,
        }
    }
}

/// Ordered, in-memory list of tasks for the lifetime of a session.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: Vec<Task>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in sample tasks.
    pub fn seeded() -> Self {
        Self {
            tasks: seed_tasks(),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Append a generated task under a fresh id and return it.
    pub fn register(&mut self, draft: TaskDraft) -> &Task {
        self.register_with_rng(draft, &mut rand::thread_rng())
    }

    pub fn register_with_rng<R: Rng + ?Sized>(&mut self, draft: TaskDraft, rng: &mut R) -> &Task {
        let id = self.fresh_id(rng);
        self.tasks.push(Task::from_draft(id, draft));
        &self.tasks[self.tasks.len() - 1]
    }

    fn fresh_id<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        for _ in 0..MAX_ID_DRAWS {
            let id = rng.gen_range(GENERATED_ID_RANGE).to_string();
            if !self.contains(&id) {
                return id;
            }
        }

        // Crowded range: take the first free slot, or go past the range.
        GENERATED_ID_RANGE
            .map(|n| n.to_string())
            .find(|id| !self.contains(id))
            .unwrap_or_else(|| {
                let max = self
                    .tasks
                    .iter()
                    .filter_map(|t| t.id.parse::<u32>().ok())
                    .max()
                    .unwrap_or(*GENERATED_ID_RANGE.end());
                (max + 1).to_string()
            })
    }
}

fn seed_tasks() -> Vec<Task> {
    vec![
        Task {
            id: "101".to_string(),
            title: "Docker-in-Docker Recursion".to_string(),
            description: "Create a multi-node swarm cluster that attempts to self-host its own \
                          registry inside a nested container with shared socket access."
                .to_string(),
            difficulty: "HARD".to_string(),
            language: "Bash/Docker".to_string(),
            prompt: "Write a script to deploy a recursive dind structure with mTLS and a custom \
                     CA provider."
                .to_string(),
        },
        Task {
            id: "102".to_string(),
            title: "Python Metaclass Injection".to_string(),
            description: "Bypass a strict static analysis tool by using dynamic metaclass \
                          generation for runtime obfuscation."
                .to_string(),
            difficulty: "EXTREME".to_string(),
            language: "Python".to_string(),
            prompt: "Design a system where classes inherit behavior from objects that are \
                     instantiated via custom __call__ overrides in a singleton metaclass."
                .to_string(),
        },
        Task {
            id: "103".to_string(),
            title: "Python Concurrency with Race Condition".to_string(),
            description: "Simulate a bank account with multiple threads depositing and \
                          withdrawing; the task exposes race conditions if not handled properly."
                .to_string(),
            difficulty: "HARD".to_string(),
            language: "Python".to_string(),
            prompt: "Create a simple Python program for a shared bank account where 10 threads \
                     each deposit $10 and withdraw $5 randomly. Use the threading module but \
                     don't mention locks explicitly. Output the final balance after all \
                     operations. What could go wrong if run multiple times?"
                .to_string(),
        },
        Task {
            id: "104".to_string(),
            title: "Docker Multi-Stage Build with Secrets".to_string(),
            description: "Build a Docker image using multi-stage builds that handles build-time \
                          secrets without leaking them into the final layer."
                .to_string(),
            difficulty: "HARD".to_string(),
            language: "Bash/Docker".to_string(),
            prompt: "Write a Dockerfile for a Node.js app that copies a secret file during build \
                     but ensures it's not in the final image. Use multi-stage and assume a .env \
                     file with API_KEY. How to build and run it without exposing the secret?"
                .to_string(),
        },
        Task {
            id: "105".to_string(),
            title: "CLI Piping with Error Handling".to_string(),
            description: "Pipe `ls` into `grep`, redirect errors to a file and handle \
                          non-existent directories."
                .to_string(),
            difficulty: "HARD".to_string(),
            language: "CLI".to_string(),
            prompt: "Make a one-liner bash command that lists files in /nonexistent, pipes to \
                     grep for \".txt\", redirects stdout to output.txt and stderr to error.log, \
                     but only if the directory exists. What if it doesn't?"
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            title: title.to_string(),
            description: "d".to_string(),
            difficulty: "HARD".to_string(),
            language: "Python".to_string(),
            prompt: "p".to_string(),
        }
    }

    #[test]
    fn test_seeded_lookup() {
        let registry = TaskRegistry::seeded();
        assert_eq!(registry.len(), 5);
        assert_eq!(registry.tasks()[0].id, "101");
        assert_eq!(
            registry.get("102").map(|t| t.title.as_str()),
            Some("Python Metaclass Injection")
        );
        assert!(registry.get("999").is_none());
    }

    #[test]
    fn test_register_appends_with_fresh_id() {
        let mut registry = TaskRegistry::seeded();
        let mut rng = StdRng::seed_from_u64(7);
        let task = registry.register_with_rng(draft("Fresh"), &mut rng).clone();

        let n: u32 = task.id.parse().unwrap();
        assert!(GENERATED_ID_RANGE.contains(&n));
        assert_eq!(registry.len(), 6);
        assert_eq!(registry.tasks().last(), Some(&task));
    }

    #[test]
    fn test_ids_stay_unique() {
        let mut registry = TaskRegistry::new();
        let mut rng = StdRng::seed_from_u64(42);
        for i in 0..950 {
            registry.register_with_rng(draft(&format!("t{}", i)), &mut rng);
        }

        let mut ids: Vec<&str> = registry.tasks().iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 950);
        // The range holds 900 ids; the rest spill past it.
        assert!(registry.contains("1100"));
    }
}
