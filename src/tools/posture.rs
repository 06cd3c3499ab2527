//! Robot posture tool

use std::sync::Arc;

use async_trait::async_trait;

use super::{ArgSchema, FieldKind, Tool, ToolArgs};
use crate::Result;
use crate::robot::{Posture, RobotControl};

/// Moves the robot to one of its predefined postures
pub struct SetPostureTool {
    robot: Arc<dyn RobotControl>,
    schema: ArgSchema,
}

impl SetPostureTool {
    /// Create the tool around a robot controller
    #[must_use]
    pub fn new(robot: Arc<dyn RobotControl>) -> Self {
        Self {
            robot,
            schema: ArgSchema::new().required(
                "posture",
                FieldKind::Enum(Posture::names()),
                "Posture to take",
            ),
        }
    }
}

#[async_trait]
impl Tool for SetPostureTool {
    fn name(&self) -> &str {
        "set_posture_to"
    }

    fn description(&self) -> &str {
        "Move the robot to a posture. Use only when asked to take or go to a posture, \
         and only with one of the listed postures."
    }

    fn schema(&self) -> &ArgSchema {
        &self.schema
    }

    async fn call(&self, args: ToolArgs) -> Result<String> {
        let posture: Posture = args.str("posture")?.parse()?;
        self.robot.set_posture(posture).await?;
        Ok("posture done".to_string())
    }
}
