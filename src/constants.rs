pub mod limits {
    pub const TITLE_MAX_CHARS: usize = 120;

    pub const CONTENT_MAX_CHARS: usize = 20_000;

    pub const AUTHOR_MAX_CHARS: usize = 100;

    pub const USERNAME_MAX_CHARS: usize = 50;

    pub const EMAIL_MAX_CHARS: usize = 255;

    pub const PASSWORD_MAX_CHARS: usize = 256;

    pub const EXCERPT_CHARS: usize = 120;
}

pub mod pagination {
    pub const DEFAULT_LIMIT: u64 = 20;

    pub const MAX_LIMIT: u64 = 100;
}

pub mod services {
    pub const BLOG: &str = "blog-service";

    pub const USERS: &str = "user-service";
}

/// Content inserted on first start when the posts table is empty.
pub mod samples {
    pub const ACCOUNTS: &[(&str, &str)] = &[("admin", "password123"), ("dev", "devpass")];

    pub const POSTS: &[(&str, &str, &str)] = &[
        (
            "Welcome to the blog",
            "admin",
            "Welcome to the microservice architecture! This blog runs on axum and PostgreSQL.",
        ),
        (
            "Automating deployments",
            "dev",
            "How to automate infrastructure management and improve the deployment pipeline.",
        ),
    ];
}
