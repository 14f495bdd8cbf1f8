mod handler;
mod model;

pub use handler::{
    comment_post, create_post, delete_post, get_feed_posts, get_group_posts, get_user_posts,
    like_post,
};
pub use model::{Comment, Post};
