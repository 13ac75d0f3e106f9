//! Types will provide the definition of table schemas, row values and the
//! avro container that carries them.

mod schema;
pub use schema::*;

mod value;
pub use value::*;

mod container;
pub use container::*;

mod to_avro;
pub use to_avro::{from_avro_schema, to_avro_schema};
