pub mod conversation {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod message {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod receipt {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod metadata {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod block {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_pg;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod presence {
    pub mod schema;
    pub mod model;
    pub mod repository;
    pub mod repository_redis;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod typing {
    pub mod schema;
    pub mod repository;
    pub mod repository_redis;
    pub mod timer;
    pub mod handle;
    pub mod service;
    pub mod route;
}

pub mod delivery {
    pub mod backend;
    pub mod engine;
    pub mod error;
    pub mod stream;
    pub mod transport;
}

pub mod websocket;
