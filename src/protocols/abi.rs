//! Contract surfaces and event shapes consumed by the protocol adapters.
//!
//! Events are declared with every parameter in the body, matching the
//! signatures the subscription filter is built from; records whose payload
//! does not decode against these shapes are dropped by the adapters.

use alloy_sol_types::sol;

sol! {
    /// V3-family pool (Uniswap V3 and Pancake V3 share this surface).
    interface IUniswapV3Pool {
        function slot0() external view returns (
            uint160 sqrtPriceX96,
            int24 tick,
            uint16 observationIndex,
            uint16 observationCardinality,
            uint16 observationCardinalityNext,
            uint8 feeProtocol,
            bool unlocked
        );

        function tickSpacing() external view returns (int24);

        function ticks(int24 tick) external view returns (
            uint128 liquidityGross,
            int128 liquidityNet,
            uint256 feeGrowthOutside0X128,
            uint256 feeGrowthOutside1X128,
            int56 tickCumulativeOutside,
            uint160 secondsPerLiquidityOutsideX128,
            uint32 secondsOutside,
            bool initialized
        );

        function tickBitmap(int16 wordPosition) external view returns (uint256 bitmap);

        event Mint(address sender, address owner, int24 tickLower, int24 tickUpper, uint128 amount, uint256 amount0, uint256 amount1);
        event Burn(address owner, int24 tickLower, int24 tickUpper, uint128 amount, uint256 amount0, uint256 amount1);
    }

    /// External lens contract that walks a Pancake pool's bitmap word.
    interface ITickLens {
        struct PopulatedTick {
            int24 tick;
            int128 liquidityNet;
            uint128 liquidityGross;
        }

        function getPopulatedTicksInWord(address pool, int16 tickBitmapIndex)
            external
            view
            returns (PopulatedTick[] memory populatedTicks);
    }

    /// V4 PoolManager singleton, queried per pool id.
    interface IPoolManager {
        function tickSpacing(bytes32 poolId) external view returns (int24);
        function getCurrentTick(bytes32 poolId) external view returns (int24);
        function getCurrentSqrtPrice(bytes32 poolId) external view returns (uint160 sqrtPriceX96);
        function getTickLiquidity(bytes32 poolId, int24 tick) external view returns (uint128 liquidity);

        struct ModifyLiquidityParams {
            bytes32 poolId;
            address sender;
            int24 tickLower;
            int24 tickUpper;
            int256 liquidityDelta;
            int256 salt;
        }

        event ModifyLiquidity(ModifyLiquidityParams params);
        event Mint(address sender, bytes32 poolId, int24 tickLower, int24 tickUpper, int128 amount);
    }
}
